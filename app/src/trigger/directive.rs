/// Power directive embedded in the printer's instruction stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    PowerOn { address: String },
    PowerOff { address: String },
}

const TOKENS: [(&str, bool); 4] = [("M80", true), ("M81", false), ("@WEMOON", true), ("@WEMOOFF", false)];

impl Directive {
    pub fn address(&self) -> &str {
        match self {
            Directive::PowerOn { address } | Directive::PowerOff { address } => address,
        }
    }

    pub fn is_power_on(&self) -> bool {
        matches!(self, Directive::PowerOn { .. })
    }
}

/// Recognizes `M80`/`M81`/`@WEMOON`/`@WEMOOFF` followed by a target address. Anything else,
/// including a directive without an address, yields `None`.
pub fn parse_directive(line: &str) -> Option<Directive> {
    let line = line.trim_end();

    TOKENS.iter().find_map(|(token, on)| {
        let rest = line.strip_prefix(token)?;

        let address = match rest.chars().next() {
            None => return None,
            Some(separator) if separator.is_whitespace() => &rest[separator.len_utf8()..],
            Some(_) => return None,
        };

        if address.is_empty() {
            return None;
        }

        let address = address.to_owned();
        Some(if *on {
            Directive::PowerOn { address }
        } else {
            Directive::PowerOff { address }
        })
    })
}
