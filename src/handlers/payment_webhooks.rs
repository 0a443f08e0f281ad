use crate::{errors::ServiceError, AppState};
use axum::{body::Bytes, extract::State, http::HeaderMap, response::IntoResponse};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

/// POST /api/v1/payments/webhook
///
/// Acknowledgment only. Gateway pushes are not trusted as a write path;
/// the authoritative flow is the client-driven check-status pull. A valid
/// notification is logged so operators can see the hint arrive, nothing
/// more.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Webhook acknowledged"),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    // Verify signature if configured
    if let Some(secret) = state.config.payment_webhook_secret.clone() {
        let tolerance = state.config.payment_webhook_tolerance_secs.unwrap_or(300);
        if !verify_signature(&headers, &body, &secret, tolerance) {
            warn!("Payment webhook signature verification failed");
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }
    }

    let json: Value = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::BadRequest(format!("invalid json: {}", e)))?;

    let reference = json
        .get("reference")
        .and_then(|v| v.as_str())
        .unwrap_or("<none>");
    let status = json
        .get("transaction_status")
        .and_then(|v| v.as_str())
        .unwrap_or("<none>");
    info!(
        reference = %reference,
        transaction_status = %status,
        "Gateway webhook received; acknowledged without writing"
    );

    Ok((axum::http::StatusCode::OK, "ok"))
}

fn verify_signature(headers: &HeaderMap, payload: &Bytes, secret: &str, tolerance_secs: u64) -> bool {
    // Generic HMAC: x-timestamp and x-signature headers
    if let (Some(ts), Some(sig)) = (headers.get("x-timestamp"), headers.get("x-signature")) {
        if let (Ok(ts), Ok(sig)) = (ts.to_str(), sig.to_str()) {
            if let Ok(ts_i) = ts.parse::<i64>() {
                let now = chrono::Utc::now().timestamp();
                if (now - ts_i).unsigned_abs() > tolerance_secs {
                    return false;
                }
            }
            let signed = format!("{}.{}", ts, std::str::from_utf8(payload).unwrap_or(""));
            let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
                Ok(mac) => mac,
                Err(_) => return false,
            };
            mac.update(signed.as_bytes());
            let expected = hex::encode(mac.finalize().into_bytes());
            return constant_time_eq(&expected, sig);
        }
    }
    false
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
