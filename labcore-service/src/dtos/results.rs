use crate::models::{LabResult, ParameterValue, ResultStatus, ResultValue, Sample, SampleStatus};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitValuesRequest {
    #[validate(length(min = 1))]
    pub values: Vec<ParameterValue>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateResultStatusRequest {
    pub status: ResultStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResultDetailResponse {
    pub result: LabResult,
    pub values: Vec<ResultValue>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSampleStatusRequest {
    pub status: SampleStatus,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SampleResponse {
    pub sample: Sample,
}
