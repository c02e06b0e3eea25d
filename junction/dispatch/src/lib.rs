//! The dispatch plane: sniffing, rule/balancer resolution, and outbound
//! dial for accepted connections, plus the webhook side-channel used to
//! report policy events. The one crate allowed to depend on both
//! `junction-router` and `junction-balance` — see `dispatcher::Dispatcher`.

pub mod admin;
pub mod dispatcher;
pub mod sniff;
pub mod webhook;

pub use admin::Runtime;
pub use dispatcher::Dispatcher;
pub use sniff::{HttpSniffer, SniffResult, Sniffer, SnifferRegistry, SshBannerSniffer, TlsSniffer};
pub use webhook::{resolve_transport, HttpWebhookTransport, UnixWebhookTransport, WebhookEvent, WebhookNotifier, WebhookTransport};
