//! Import links for a freshly created node.

use crate::model::deploy::CreateWorkerResponse;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;

/// Characters left alone by URI component encoding.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub const SUBSCRIPTION_CONVERTER_URL: &str = "https://edsub.pages.dev/sub/clash-meta";
pub const DEFAULT_CLASH_PROFILE_NAME: &str = "worker节点";
pub const DEFAULT_SHADOWROCKET_REMARK: &str = "cf worker";

/// Links shown after a successful deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeLinks {
    pub node: String,
    /// Worker management URL returned by the backend.
    pub worker_url: String,
    pub subscription_url: String,
    pub clash_url: String,
    pub shadowrocket_url: String,
}

impl NodeLinks {
    pub fn from_response(response: &CreateWorkerResponse) -> Self {
        let subscription = subscription_url(&response.node);
        Self {
            node: response.node.clone(),
            worker_url: response.url.clone(),
            clash_url: clash_import_url(&subscription, DEFAULT_CLASH_PROFILE_NAME),
            shadowrocket_url: shadowrocket_import_url(&subscription, DEFAULT_SHADOWROCKET_REMARK),
            subscription_url: subscription,
        }
    }
}

pub fn encode_uri_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// Clash-Meta subscription wrapping a single node link.
pub fn subscription_url(node: &str) -> String {
    format!(
        "{SUBSCRIPTION_CONVERTER_URL}?url={}&insert=false",
        encode_uri_component(node)
    )
}

pub fn clash_import_url(subscription: &str, profile_name: &str) -> String {
    format!(
        "clash://install-config/?url={}&name={}",
        encode_uri_component(subscription),
        encode_uri_component(profile_name)
    )
}

pub fn shadowrocket_import_url(subscription: &str, remark: &str) -> String {
    format!(
        "shadowrocket://add/sub://{}?remark={}",
        STANDARD.encode(subscription.as_bytes()),
        encode_uri_component(remark)
    )
}
