//! Domain models for labcore-service.

pub mod audit;
pub mod catalog;
pub mod invoice;
pub mod lab;
pub mod order;
pub mod patient;
pub mod report;
pub mod result;
pub mod role;
pub mod sample;

pub use audit::{actions, AuditEntry, AuditLog};
pub use catalog::{
    CreateRateCard, CreateTestDefinition, NewTestParameter, RateCard, RateCardItem,
    TestDefinition, TestParameter,
};
pub use invoice::{Invoice, InvoiceStatus, Payment, PaymentMode, RecordPayment};
pub use lab::Lab;
pub use order::{CreateOrder, Order, OrderItem, OrderPriority};
pub use patient::{CreatePatient, ListPatientsFilter, Patient, UpdatePatient};
pub use report::{RenderStatus, Report, ReportShare};
pub use result::{LabResult, ParameterValue, ResultStatus, ResultValue};
pub use role::{Action, Role};
pub use sample::{Sample, SampleStatus};
