//! Selector resolution with fallback
//!
//! Recorded click steps carry a CSS selector and, optionally, a structural
//! XPath. Markup drifts between recordings and replays, so an action is
//! retried through the fallback when the primary selector fails. The
//! returned [`Resolved`] always says which selector did the work.

use std::fmt::Display;
use std::future::Future;

use tracing::{debug, info, warn};

/// A successful action and the selector it went through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    pub value: T,
    pub selector: String,
    pub fallback_used: bool,
}

/// Run `action` with `primary`, then with `fallback` if the primary fails.
///
/// When both fail (or there is no fallback) the primary's error is returned.
/// An empty primary goes straight to the fallback.
pub async fn resolve_and_act<T, E, F, Fut>(
    primary: &str,
    fallback: Option<&str>,
    mut action: F,
) -> Result<Resolved<T>, E>
where
    E: Display,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let fallback = fallback.filter(|f| !f.trim().is_empty());

    if primary.trim().is_empty() {
        if let Some(fallback) = fallback {
            debug!("No primary selector, using fallback {}", fallback);
            let value = action(fallback.to_string()).await?;
            info!("Used fallback selector: {}", fallback);
            return Ok(Resolved {
                value,
                selector: fallback.to_string(),
                fallback_used: true,
            });
        }
    }

    let primary_err = match action(primary.to_string()).await {
        Ok(value) => {
            return Ok(Resolved {
                value,
                selector: primary.to_string(),
                fallback_used: false,
            })
        }
        Err(e) => e,
    };

    let Some(fallback) = fallback else {
        return Err(primary_err);
    };

    warn!(
        "Primary selector {} failed ({}), trying fallback {}",
        primary, primary_err, fallback
    );

    match action(fallback.to_string()).await {
        Ok(value) => {
            info!("Used fallback selector: {}", fallback);
            Ok(Resolved {
                value,
                selector: fallback.to_string(),
                fallback_used: true,
            })
        }
        Err(fallback_err) => {
            warn!("Fallback selector {} failed too: {}", fallback, fallback_err);
            Err(primary_err)
        }
    }
}
