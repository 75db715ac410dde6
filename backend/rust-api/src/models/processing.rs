use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Status vocabulary of a document-processing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Uploading,
    Processing,
    Decoding,
    OcrCompleted,
    AiProcessing,
    Completed,
    #[serde(alias = "failure")]
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Uploading => "uploading",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Decoding => "decoding",
            ProcessingStatus::OcrCompleted => "ocr_completed",
            ProcessingStatus::AiProcessing => "ai_processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }
}

impl FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "uploading" => Ok(ProcessingStatus::Uploading),
            "processing" => Ok(ProcessingStatus::Processing),
            "decoding" => Ok(ProcessingStatus::Decoding),
            "ocr_completed" => Ok(ProcessingStatus::OcrCompleted),
            "ai_processing" => Ok(ProcessingStatus::AiProcessing),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" | "failure" => Ok(ProcessingStatus::Failed),
            _ => Err(format!("Invalid processing status: {}", value)),
        }
    }
}

/// One status read of a resource session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingSnapshot {
    pub id: String,
    pub status: ProcessingStatus,
    #[serde(default, alias = "unparsable")]
    pub error_message: Option<String>,
}
