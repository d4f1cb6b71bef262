//! Near-GitHub-rate-limit probe: a dispatcher-independent GET that hints the
//! dispatcher not to hand out tasks needing a fresh GitHub pull. Failure is
//! advisory and leaves the flag at its previous value.

use worker_core::constants::{GITHUB_RATE_LIMIT_FLOOR, GITHUB_RATE_LIMIT_URL};

/// Probes GitHub's rate-limit endpoint and returns whether the worker is
/// near the limit, falling back to `previous` on any failure to parse or
/// reach it.
pub async fn probe(http: &reqwest::Client, previous: bool) -> bool {
    match http.get(GITHUB_RATE_LIMIT_URL).send().await {
        Ok(res) => match res.error_for_status() {
            Ok(res) => match res.json::<serde_json::Value>().await {
                Ok(body) => remaining_calls(&body)
                    .map(|remaining| remaining <= GITHUB_RATE_LIMIT_FLOOR as u64)
                    .unwrap_or(previous),
                Err(err) => {
                    tracing::warn!(error = %err, "malformed github rate_limit response");
                    previous
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "github rate_limit probe rejected");
                previous
            }
        },
        Err(err) => {
            tracing::warn!(error = %err, "github rate_limit probe unreachable");
            previous
        }
    }
}

fn remaining_calls(body: &serde_json::Value) -> Option<u64> {
    body.pointer("/resources/core/remaining")
        .or_else(|| body.pointer("/rate/remaining"))
        .and_then(serde_json::Value::as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_remaining_from_resources_core_shape() {
        let body = serde_json::json!({"resources": {"core": {"remaining": 4}}});
        assert_eq!(remaining_calls(&body), Some(4));
    }

    #[test]
    fn reads_remaining_from_flat_rate_shape() {
        let body = serde_json::json!({"rate": {"remaining": 9999}});
        assert_eq!(remaining_calls(&body), Some(9999));
    }

    #[test]
    fn missing_field_returns_none() {
        let body = serde_json::json!({});
        assert_eq!(remaining_calls(&body), None);
    }
}
