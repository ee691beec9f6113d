//! Optional HTTP sink for answered texts. Fire and forget.

use vtuber_core::TextOut;

pub async fn text_out_to_http(client: &reqwest::Client, addr: &str, text_out: &TextOut) {
    if addr.is_empty() {
        return;
    }
    if let Err(e) = client.post(addr).json(text_out).send().await {
        tracing::debug!(addr, error = %e, "text out http sink failed");
    }
}
