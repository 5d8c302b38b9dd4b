//! Provider implementations.

mod cod;
mod esewa;
mod khalti;

pub use cod::CodGateway;
pub use esewa::{EsewaGateway, EsewaStatus, EsewaStatusApi, EsewaStatusQuery, HttpEsewaStatusApi};
pub use khalti::{
    HttpKhaltiApi, KhaltiApi, KhaltiCustomer, KhaltiGateway, KhaltiInitiateRequest,
    KhaltiInitiateResponse, KhaltiLookup,
};

use crate::error::GatewayError;

/// Longest provider error body kept in an error message.
const MAX_ERROR_BODY: usize = 512;

/// Turns a non-2xx provider response into [`GatewayError::Provider`].
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        body.truncate(cut);
    }
    Err(GatewayError::Provider {
        status: status.as_u16(),
        body,
    })
}
