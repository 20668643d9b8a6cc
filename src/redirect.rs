use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, warn};

use crate::command::{CommandLine, shell_quote};
use crate::config::RedirectCheck;
use crate::runner::Runner;

/// State of the certificate served by a redirect target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Certificate {
    Valid { days_left: i64 },
    ExpiringSoon { days_left: i64 },
    Expired { days_left: i64 },
    Unavailable(String),
}

impl Certificate {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Valid { .. } | Self::ExpiringSoon { .. })
    }

    #[must_use]
    pub fn from_expiry(not_after: DateTime<Utc>, now: DateTime<Utc>, warn_days: i64) -> Self {
        let days_left = (not_after - now).num_days();
        if not_after <= now {
            Self::Expired { days_left }
        } else if days_left < warn_days {
            Self::ExpiringSoon { days_left }
        } else {
            Self::Valid { days_left }
        }
    }
}

/// Result of one [`RedirectCheck`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectOutcome {
    pub from: String,
    pub expected: String,
    pub status: u16,
    pub location: String,
    pub redirect_ok: bool,
    /// `None` for plain-http targets, and when the request failed.
    pub certificate: Option<Certificate>,
    /// Why the request itself failed, e.g. an unresolvable host.
    pub error: Option<String>,
}

impl RedirectOutcome {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.redirect_ok && self.certificate.as_ref().is_none_or(Certificate::is_ok)
    }
}

/// Verify that `check.from` answers with the expected redirect, and
/// inspect the certificate of an https target. A request that fails
/// outright yields a failed outcome rather than an error.
#[must_use]
pub fn check(runner: &dyn Runner, check: &RedirectCheck) -> RedirectOutcome {
    let curl = CommandLine::new("curl").args([
        "-s",
        "-o",
        "/dev/null",
        "-w",
        "%{http_code} %{redirect_url}",
        check.from.as_str(),
    ]);
    let output = match runner.run(&curl) {
        Ok(output) => output,
        Err(e) => {
            warn!(from = %check.from, error = %e, "redirect check failed");
            return RedirectOutcome {
                from: check.from.clone(),
                expected: check.to.clone(),
                status: 0,
                location: String::new(),
                redirect_ok: false,
                certificate: None,
                error: Some(e.to_string()),
            };
        }
    };
    let (status, location) = parse_curl_output(&output).unwrap_or((0, String::new()));
    debug!(from = %check.from, status, %location, "redirect answered");

    let redirect_ok = status == check.status && same_location(&location, &check.to);

    let certificate = https_host(&check.to).map(|host| {
        certificate_expiry(runner, &host).map_or_else(Certificate::Unavailable, |not_after| {
            Certificate::from_expiry(not_after, Utc::now(), check.warn_days)
        })
    });

    RedirectOutcome {
        from: check.from.clone(),
        expected: check.to.clone(),
        status,
        location,
        redirect_ok,
        certificate,
        error: None,
    }
}

fn certificate_expiry(runner: &dyn Runner, host: &str) -> Result<DateTime<Utc>, String> {
    let (name, port) = host.split_once(':').unwrap_or((host, "443"));
    let script = format!(
        "echo | openssl s_client -servername {name} -connect {name}:{port} 2>/dev/null \
         | openssl x509 -noout -enddate",
        name = shell_quote(name),
        port = shell_quote(port),
    );
    let output = runner
        .run(&CommandLine::new("sh").args(["-c", script.as_str()]))
        .map_err(|e| e.to_string())?;
    let unexpected = || format!("unexpected openssl output: {output}");
    parse_not_after(&output).ok_or_else(unexpected)
}

/// Parse curl's `-w "%{http_code} %{redirect_url}"` output.
#[must_use]
pub fn parse_curl_output(output: &str) -> Option<(u16, String)> {
    let output = output.trim();
    let (code, location) = output.split_once(' ').unwrap_or((output, ""));
    let code = code.parse().ok()?;
    Some((code, location.trim().to_string()))
}

/// Parse `notAfter=Mar  4 12:00:00 2027 GMT` as printed by
/// `openssl x509 -enddate`.
#[must_use]
pub fn parse_not_after(output: &str) -> Option<DateTime<Utc>> {
    let line = output
        .lines()
        .find_map(|l| l.trim().strip_prefix("notAfter="))?;
    let normalized = line.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&normalized, "%b %e %H:%M:%S %Y GMT")
        .ok()
        .map(|dt| dt.and_utc())
}

/// Host (with port, if any) of an https URL.
#[must_use]
pub fn https_host(url: &str) -> Option<String> {
    let rest = url.strip_prefix("https://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?;
    (!host.is_empty()).then(|| host.to_string())
}

fn same_location(actual: &str, expected: &str) -> bool {
    actual.trim_end_matches('/') == expected.trim_end_matches('/')
}
