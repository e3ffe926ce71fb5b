//! Proxy reachability pre-flight.
//!
//! A short probe run before a proxied capture so a dead proxy fails the
//! start immediately instead of wasting the stream's opening minutes on
//! child retries.

use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;
use tracing::{debug, error};

use super::capture::streamlink_binary;
use crate::domain::value_objects::ProxyConfig;
use crate::{Error, Result};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Stderr fragments that identify a proxy failure rather than an
/// ordinary "channel offline" response.
static PROXY_ERRORS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        "(?i)unable to connect to proxy\
         |proxy connection failed\
         |connection refused\
         |proxy error\
         |failed to connect\
         |network is unreachable\
         |connection timed out\
         |name or service not known",
    )
    .expect("valid proxy error pattern")
});

/// Probe the configured proxy. `Ok(())` when no proxy is configured.
pub async fn check_proxy_connectivity(proxy: &ProxyConfig) -> Result<()> {
    if !proxy.is_configured() {
        return Ok(());
    }

    let mut command = Command::new(streamlink_binary());
    command
        .arg("--json")
        .arg("twitch.tv/test")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(http) = &proxy.http {
        command.arg("--http-proxy").arg(http);
    }
    if let Some(https) = &proxy.https {
        command.arg("--https-proxy").arg(https);
    }

    let output = match tokio::time::timeout(PROBE_TIMEOUT, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(Error::Spawn {
                command: "streamlink proxy probe".to_string(),
                source: e,
            });
        }
        Err(_) => {
            error!("Proxy connectivity check timed out after {}s", PROBE_TIMEOUT.as_secs());
            return Err(Error::ProxyUnreachable(format!(
                "proxy connectivity check timed out after {}s",
                PROBE_TIMEOUT.as_secs()
            )));
        }
    };

    let stderr = String::from_utf8_lossy(&output.stderr);
    if let Some(found) = PROXY_ERRORS.find(&stderr) {
        let pattern = found.as_str();
        error!(pattern, "Proxy connectivity check failed");
        return Err(Error::ProxyUnreachable(format!(
            "proxy connectivity check failed: {pattern}"
        )));
    }

    debug!("Proxy connectivity check passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_proxy_passes() {
        check_proxy_connectivity(&ProxyConfig::default())
            .await
            .unwrap();
    }

    #[test]
    fn test_patterns_match_case_insensitively() {
        assert!(PROXY_ERRORS.is_match("error: Name or service not known"));
        assert!(PROXY_ERRORS.is_match("[cli][error] Unable to connect to proxy"));
        assert!(PROXY_ERRORS.is_match("Connection refused (os error 111)"));
        assert!(!PROXY_ERRORS.is_match("[cli][info] Stream ended"));
    }
}
