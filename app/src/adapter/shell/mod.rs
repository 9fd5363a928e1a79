use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context as _, anyhow, bail};
use serde::Deserialize;

use crate::port::{PrinterHost, SwitchDriver};

/// Command templates run through `sh -c`. `{address}` and `{ip}` are replaced with the configured
/// and the resolved address of the switch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShellSettings {
    #[serde(default)]
    pub switch_on: String,
    #[serde(default)]
    pub switch_off: String,
    #[serde(default)]
    pub switch_state: String,
    #[serde(default)]
    pub printer_connect: String,
    #[serde(default)]
    pub printer_disconnect: String,
}

pub struct ShellSwitchDriver {
    settings: ShellSettings,
}

impl ShellSwitchDriver {
    pub fn new(settings: ShellSettings) -> Self {
        Self { settings }
    }
}

impl SwitchDriver for ShellSwitchDriver {
    async fn query(&self, address: &str, ip: IpAddr) -> anyhow::Result<i32> {
        let command = render("switch_state", &self.settings.switch_state, address, ip)?;
        let output = run_shell(&command).await?;

        output
            .trim()
            .parse::<i32>()
            .with_context(|| format!("Unexpected state output of {}: '{}'", address, output.trim()))
    }

    async fn switch(&self, address: &str, ip: IpAddr, on: bool) -> anyhow::Result<()> {
        let command = if on {
            render("switch_on", &self.settings.switch_on, address, ip)?
        } else {
            render("switch_off", &self.settings.switch_off, address, ip)?
        };

        run_shell(&command).await.map(|_| ())
    }
}

/// Whether the printer is busy printing, as last reported by the printer application.
#[derive(Debug, Clone, Default)]
pub struct PrinterActivity {
    printing: Arc<AtomicBool>,
}

impl PrinterActivity {
    pub fn set_printing(&self, printing: bool) {
        let was_printing = self.printing.swap(printing, Ordering::SeqCst);
        if was_printing != printing {
            tracing::info!("Printer is {}", if printing { "printing" } else { "idle" });
        }
    }

    pub fn is_printing(&self) -> bool {
        self.printing.load(Ordering::SeqCst)
    }
}

pub struct ShellPrinterHost {
    settings: ShellSettings,
    activity: PrinterActivity,
}

impl ShellPrinterHost {
    pub fn new(settings: ShellSettings, activity: PrinterActivity) -> Self {
        Self { settings, activity }
    }

    async fn run_optional(&self, name: &str, command: &str) -> anyhow::Result<()> {
        if command.trim().is_empty() {
            tracing::debug!("No {} command configured, skipping", name);
            return Ok(());
        }

        run_shell(command).await.map(|_| ())
    }
}

impl PrinterHost for ShellPrinterHost {
    fn is_printing(&self) -> bool {
        self.activity.is_printing()
    }

    async fn connect(&self) -> anyhow::Result<()> {
        self.run_optional("printer_connect", &self.settings.printer_connect).await
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        self.run_optional("printer_disconnect", &self.settings.printer_disconnect)
            .await
    }

    async fn run_system_command(&self, command: &str) -> anyhow::Result<()> {
        run_shell(command).await.map(|_| ())
    }
}

fn render(name: &str, template: &str, address: &str, ip: IpAddr) -> anyhow::Result<String> {
    if template.trim().is_empty() {
        bail!("No {} command configured", name);
    }

    Ok(template.replace("{address}", address).replace("{ip}", &ip.to_string()))
}

/// Runs a command line through `sh -c` and returns its standard output.
pub async fn run_shell(command: &str) -> anyhow::Result<String> {
    tracing::debug!("Executing: {}", command);

    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("Failed to execute '{}'", command))?;

    if !output.status.success() {
        return Err(anyhow!(
            "'{}' failed with {}: {}",
            command,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    const IP: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));

    #[test]
    fn renders_placeholders() {
        let command = render("switch_on", "plugctl --host {address} --ip {ip} on", "plug.local", IP).unwrap();

        assert_eq!(command, "plugctl --host plug.local --ip 10.0.0.5 on");
    }

    #[test]
    fn empty_template_is_an_error() {
        assert!(render("switch_on", " ", "plug.local", IP).is_err());
    }

    #[tokio::test]
    async fn returns_stdout_of_command() {
        assert_eq!(run_shell("echo hello").await.unwrap(), "hello\n");
    }

    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let error = run_shell("echo broken >&2; exit 3").await.unwrap_err();

        assert!(error.to_string().contains("broken"), "{}", error);
    }

    #[tokio::test]
    async fn driver_parses_state_code() {
        let driver = ShellSwitchDriver::new(ShellSettings {
            switch_state: "echo 8".to_owned(),
            ..Default::default()
        });

        assert_eq!(driver.query("plug.local", IP).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn driver_rejects_garbage_state() {
        let driver = ShellSwitchDriver::new(ShellSettings {
            switch_state: "echo standby".to_owned(),
            ..Default::default()
        });

        assert!(driver.query("plug.local", IP).await.is_err());
    }

    #[tokio::test]
    async fn host_skips_unconfigured_connect() {
        let host = ShellPrinterHost::new(ShellSettings::default(), PrinterActivity::default());

        assert!(host.connect().await.is_ok());
    }

    #[test]
    fn activity_is_shared_between_clones() {
        let activity = PrinterActivity::default();
        let host = ShellPrinterHost::new(ShellSettings::default(), activity.clone());

        activity.set_printing(true);
        assert!(host.is_printing());
    }
}
