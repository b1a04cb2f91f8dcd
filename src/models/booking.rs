use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::presence::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RideType {
    Economy,
    Comfort,
    Premium,
    Van,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    Standard,
    Express,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum BookingKind {
    Ride { ride_type: RideType },
    Delivery { delivery_type: DeliveryType },
    DayHire { hours: u32 },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Assigned,
    Arrived,
    InProgress,
    Completed,
    Cancelled,
    Expired,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Cancelled | BookingStatus::Expired
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub kind: BookingKind,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub status: BookingStatus,
    pub provider_id: Option<Uuid>,
    pub quoted_fare: Option<f64>,
    /// None for immediate bookings; Some for scheduled (day-hire) ones.
    pub scheduled_start: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rejection {
    pub booking_id: Uuid,
    pub provider_id: Uuid,
    pub reason: String,
    pub rejected_at: DateTime<Utc>,
}
