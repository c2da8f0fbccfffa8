use std::{path::PathBuf, process::Stdio, time::Duration};

use async_trait::async_trait;
use base64::{Engine, prelude::BASE64_STANDARD};
use bon::Builder;
use http::{
    HeaderMap,
    header::{AUTHORIZATION, COOKIE},
};
#[cfg(test)]
use mockall::automock;
use tokio::{io::AsyncWriteExt, process::Command, time::timeout};
use tracing::{info, warn};

const SESSION_USER_COOKIE: &str = "hawk_remember_me_id";
const SESSION_KEY_COOKIE: &str = "hawk_remember_me_key";

// Decides whether a request may read the CIB. Any doubt must result in a denial.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authorize(&self, headers: &HeaderMap) -> bool;
}

// Validates Hawk session cookies with `attrd_updater`, or Basic credentials with `hawk_chkpwd`.
#[derive(Builder, Debug)]
pub struct HawkAuthenticator {
    #[builder(into)]
    attrd_updater: PathBuf,
    #[builder(into)]
    hawk_chkpwd: PathBuf,
    // Upper bound for each external check.
    timeout: Duration,
}

#[async_trait]
impl Authenticator for HawkAuthenticator {
    async fn authorize(&self, headers: &HeaderMap) -> bool {
        if let Some((user, session)) = session_cookies(headers) {
            if self.check_session(&user, &session).await {
                info!(%user, "Valid session cookie.");
                return true;
            }
        }
        match basic_credentials(headers) {
            Some((user, password)) => self.check_password(&user, &password).await,
            None => false,
        }
    }
}

impl HawkAuthenticator {
    // The session is valid if attrd holds it as the value of the user's session attribute.
    async fn check_session(&self, user: &str, session: &str) -> bool {
        let output = timeout(
            self.timeout,
            Command::new(&self.attrd_updater)
                .args(["-R", "-Q", "-A", "-n"])
                .arg(format!("hawk_session_{user}"))
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await;
        match output {
            Ok(Ok(output)) => {
                session_matches(&String::from_utf8_lossy(&output.stdout), session)
            }
            Ok(Err(error)) => {
                warn!(%error, "Session check failed.");
                false
            }
            Err(_) => {
                warn!("Session check timed out.");
                false
            }
        }
    }

    async fn check_password(&self, user: &str, password: &str) -> bool {
        let result = timeout(self.timeout, async {
            let mut child = Command::new(&self.hawk_chkpwd)
                .args(["passwd", user])
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()?;
            if let Some(mut stdin) = child.stdin.take() {
                // The tool may exit without reading; its exit status is what matters.
                let _ = stdin.write_all(password.as_bytes()).await;
            }
            child.wait().await
        })
        .await;
        match result {
            Ok(Ok(status)) if status.success() => true,
            Ok(Ok(status)) => {
                warn!(%user, %status, "Authorization failed.");
                false
            }
            Ok(Err(error)) => {
                warn!(%user, %error, "Authorization failed.");
                false
            }
            Err(_) => {
                warn!(%user, "Authorization timed out.");
                false
            }
        }
    }
}

// Extract the Hawk session user and key from the request's cookies.
fn session_cookies(headers: &HeaderMap) -> Option<(String, String)> {
    let mut user = None;
    let mut session = None;
    for (name, value) in headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
    {
        match name {
            SESSION_USER_COOKIE => user = Some(value),
            SESSION_KEY_COOKIE => session = Some(value),
            _ => (),
        }
    }
    match (user, session) {
        (Some(user), Some(session))
            if !user.is_empty() && !session.is_empty() && !session.contains('"') =>
        {
            Some((user.to_string(), session.to_string()))
        }
        _ => None,
    }
}

fn session_matches(attrd_output: &str, session: &str) -> bool {
    let needle = format!("value=\"{session}\"");
    attrd_output.lines().any(|line| line.contains(&needle))
}

// Extract the user and password from a Basic Authorization header.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = BASE64_STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    if user.is_empty() {
        return None;
    }
    Some((user.to_string(), password.to_string()))
}
