pub mod booking;
pub mod professional_earnings;
pub mod profile;
pub mod rebook_nudge_assignment;
pub mod webhook_event;

pub use booking::{BookingStatus, PaymentStatus};
