//! Bus transport: the non-blocking seam the element layer talks through,
//! and its zbus implementation.

mod transport;
mod zbus_transport;

pub use transport::{
    Argument, BusEvent, BusEventSender, BusEvents, BusTransport, CallId, MethodCall, PendingCall,
    SignalRule, SubscriptionHandle, SubscriptionId, WireValue, event_channel,
};
pub use zbus_transport::ZbusTransport;
