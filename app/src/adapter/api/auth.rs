use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use actix_web::{FromRequest, HttpRequest, dev::Payload, http::header, web};
use futures::future::{Ready, ready};

use super::ApiError;
use crate::switch::SwitchError;

const API_KEY_HEADER: &str = "X-Api-Key";

/// API keys allowed to use the control surface. An empty set denies everything.
#[derive(Clone)]
pub struct ApiAccess {
    keys: Arc<RwLock<HashSet<String>>>,
}

impl ApiAccess {
    pub fn new(keys: Vec<String>) -> Self {
        if keys.is_empty() {
            tracing::warn!("No API keys configured, all API requests will be denied");
        }

        Self {
            keys: Arc::new(RwLock::new(keys.into_iter().collect())),
        }
    }

    pub fn replace(&self, keys: Vec<String>) {
        *self.keys.write().unwrap_or_else(PoisonError::into_inner) = keys.into_iter().collect();
    }

    fn allows(&self, key: &str) -> bool {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).contains(key)
    }
}

fn presented_key(req: &HttpRequest) -> Option<&str> {
    if let Some(key) = req.headers().get(API_KEY_HEADER) {
        return key.to_str().ok();
    }

    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Extractor guarding a handler. Must come first in the handler arguments so a rejected
/// request fails before anything else is read.
pub(super) struct Authorized;

impl FromRequest for Authorized {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let allowed = match (req.app_data::<web::Data<ApiAccess>>(), presented_key(req)) {
            (Some(access), Some(key)) => access.allows(key.trim()),
            _ => false,
        };

        if allowed {
            ready(Ok(Authorized))
        } else {
            tracing::warn!("Rejected unauthorized request to {}", req.path());
            ready(Err(ApiError::Switch(SwitchError::PermissionDenied)))
        }
    }
}

#[cfg(test)]
mod tests {
    use actix_web::test::TestRequest;

    use super::*;

    #[test]
    fn reads_key_from_header_or_bearer_token() {
        let req = TestRequest::default().insert_header((API_KEY_HEADER, "abc")).to_http_request();
        assert_eq!(presented_key(&req), Some("abc"));

        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer xyz"))
            .to_http_request();
        assert_eq!(presented_key(&req), Some("xyz"));

        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Basic xyz"))
            .to_http_request();
        assert_eq!(presented_key(&req), None);
    }

    #[test]
    fn empty_key_set_denies_everything() {
        let access = ApiAccess::new(vec![]);
        assert!(!access.allows(""));

        access.replace(vec!["abc".to_owned()]);
        assert!(access.allows("abc"));
        assert!(!access.allows("abd"));
    }
}
