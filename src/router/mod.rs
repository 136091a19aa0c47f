//! Routing records kept in the backing store.
//!
//! Key layout read by the data plane:
//!
//! - `frontend:<hostname>`: route record, element 0 is the owning app name,
//!   the rest are backend addresses in insertion order
//! - `cname:<app>`: aliases set for the app
//! - `healthcheck:<hostname>`: `path`, `status`, `body` hash
//! - `tls:<hostname>`: `certificate`, `key` hash

mod backend;
mod certificate;
mod cname;
pub mod hipache;
pub mod planb;
mod swap;

use url::Url;

use crate::core::error::{RouterError, RouterResult};

pub use hipache::HipacheRouter;

pub const CERTIFICATE_FIELD: &str = "certificate";
pub const KEY_FIELD: &str = "key";

pub fn frontend_key(hostname: &str) -> String {
    format!("frontend:{hostname}")
}

pub fn cname_key(app: &str) -> String {
    format!("cname:{app}")
}

pub fn healthcheck_key(hostname: &str) -> String {
    format!("healthcheck:{hostname}")
}

pub fn tls_key(hostname: &str) -> String {
    format!("tls:{hostname}")
}

/// Text form of an address as stored in route records.
///
/// `Url` always serialises an empty path as `/`; the data plane expects
/// `http://10.10.10.10:8080` rather than `http://10.10.10.10:8080/`.
pub fn address_string(address: &Url) -> String {
    let s = address.as_str();
    if address.path() == "/"
        && address.query().is_none()
        && address.fragment().is_none()
        && s.ends_with('/')
    {
        s[..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

fn parse_address(address: &str) -> RouterResult<Url> {
    Url::parse(address).map_err(|e| RouterError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

/// Addresses of a route record, skipping the header.
fn record_addresses(record: &[String]) -> &[String] {
    record.get(1..).unwrap_or_default()
}

/// Builds a route record from a header and addresses.
fn route_record(app: &str, addresses: &[String]) -> Vec<String> {
    let mut record = Vec::with_capacity(addresses.len() + 1);
    record.push(app.to_string());
    record.extend_from_slice(addresses);
    record
}
