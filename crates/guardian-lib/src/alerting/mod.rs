//! Alert signals, alert state and the dispatcher that turns one into the other

mod channel_state;
mod dispatcher;
mod rate_limit;
mod signal;
mod state;

pub use channel_state::{Admission, ChannelState, ChannelStatus};
pub use dispatcher::{ChannelTestResult, Dispatcher, DispatcherConfig};
pub use rate_limit::TokenBucket;
pub use signal::{AlertKey, AlertSignal, AlertType, Severity, SignalContext, SignalSource};
pub use state::{ActiveAlert, AlertState, DeliveryOutcome, DeliveryRecord, MAX_DELIVERY_RECORDS};
