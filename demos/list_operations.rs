//! List operations for one site.
//!
//! Run:
//! `cargo run --example list_operations -- <site_id>`
//!
//! Optional env vars:
//! - `NMDC_BASE_URL` (defaults to the dev deployment)
//! - `NMDC_CREDENTIALS` (defaults to `~/.nmdc-creds.json`)

use nmdc_api::{ClientConfig, DEFAULT_OPERATION_PAGE_SIZE, NmdcClient, default_credentials_path};
use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let site_id = std::env::args().nth(1).ok_or("usage: list_operations <site_id>")?;

    let mut config = ClientConfig::default();
    if let Ok(url) = std::env::var("NMDC_BASE_URL") {
        config.base_url = url;
    }
    config.credentials_path = std::env::var_os("NMDC_CREDENTIALS")
        .map(Into::into)
        .or_else(default_credentials_path);

    let client = NmdcClient::connect(config)?;
    println!("auth: {:?}", client.auth_status());

    let filter = json!({ "metadata.site_id": site_id });
    let ops = client.list_ops(Some(&filter), DEFAULT_OPERATION_PAGE_SIZE)?;
    println!("{} operations", ops.len());
    for op in &ops {
        println!("- {} done={}", op["id"], op["done"]);
    }
    Ok(())
}
