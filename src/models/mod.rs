pub mod borrow_record;
pub mod borrow_request;
pub mod card;
pub mod category;
pub mod condition_record;
pub mod digital_resource;
pub mod extension;
pub mod fine;
pub mod fine_policy;
pub mod instance;
pub mod inventory;
pub mod item;
pub mod record_detail;
pub mod request_line;
pub mod reservation;
pub mod resource_line;
pub mod status;

pub use status::{
    BorrowType, CardStatus, ChargeKind, ConditionType, DetailStatus, FineStatus, InstanceStatus,
    RecordOrigin, RequestStatus, ReservationStatus,
};
