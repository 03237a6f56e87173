//! Editable stage forms.
//!
//! Fields are kept as the raw text the operator typed; nothing is parsed
//! until a request is built, so a half-typed value never loses input.

use crate::error::ValidationError;
use lorakit_client::{EvalRequest, LoraType, TrainConfig};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_MODEL: &str = "meta-llama/Meta-Llama-3-8B";
pub const DEFAULT_ADAPTER_PATH: &str = "outputs/adapters/adapter";

/// Training settings as entered on the settings stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainForm {
    pub base_model: String,
    pub lora_type: String,
    pub num_epochs: String,
    pub lr: String,
    pub batch_size: String,
    pub grad_accum_steps: String,
    pub max_seq_len: String,
}

impl Default for TrainForm {
    fn default() -> Self {
        Self {
            base_model: DEFAULT_BASE_MODEL.to_string(),
            lora_type: LoraType::QLora.as_str().to_string(),
            num_epochs: "1".to_string(),
            lr: "2e-4".to_string(),
            batch_size: "1".to_string(),
            grad_accum_steps: "4".to_string(),
            max_seq_len: "2048".to_string(),
        }
    }
}

/// Editable fields of [`TrainForm`], for generic field editors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainField {
    BaseModel,
    LoraType,
    NumEpochs,
    Lr,
    BatchSize,
    GradAccumSteps,
    MaxSeqLen,
}

impl TrainField {
    pub const ALL: [TrainField; 7] = [
        Self::BaseModel,
        Self::LoraType,
        Self::NumEpochs,
        Self::Lr,
        Self::BatchSize,
        Self::GradAccumSteps,
        Self::MaxSeqLen,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::BaseModel => "base_model",
            Self::LoraType => "lora_type",
            Self::NumEpochs => "num_epochs",
            Self::Lr => "lr",
            Self::BatchSize => "batch_size",
            Self::GradAccumSteps => "grad_accum_steps",
            Self::MaxSeqLen => "max_seq_len",
        }
    }
}

impl std::fmt::Display for TrainField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl TrainForm {
    pub fn get(&self, field: TrainField) -> &str {
        match field {
            TrainField::BaseModel => &self.base_model,
            TrainField::LoraType => &self.lora_type,
            TrainField::NumEpochs => &self.num_epochs,
            TrainField::Lr => &self.lr,
            TrainField::BatchSize => &self.batch_size,
            TrainField::GradAccumSteps => &self.grad_accum_steps,
            TrainField::MaxSeqLen => &self.max_seq_len,
        }
    }

    pub fn set(&mut self, field: TrainField, value: impl Into<String>) {
        let value = value.into();
        match field {
            TrainField::BaseModel => self.base_model = value,
            TrainField::LoraType => self.lora_type = value,
            TrainField::NumEpochs => self.num_epochs = value,
            TrainField::Lr => self.lr = value,
            TrainField::BatchSize => self.batch_size = value,
            TrainField::GradAccumSteps => self.grad_accum_steps = value,
            TrainField::MaxSeqLen => self.max_seq_len = value,
        }
    }

    /// Parses every field into a [`TrainConfig`]. The first invalid field
    /// is reported.
    pub fn validate(&self) -> Result<TrainConfig, ValidationError> {
        let base_model = required("base_model", &self.base_model)?;
        let lora_type = self
            .lora_type
            .parse::<LoraType>()
            .map_err(|e| ValidationError::new("lora_type", e))?;

        Ok(TrainConfig {
            base_model,
            lora_type,
            num_epochs: positive_count("num_epochs", &self.num_epochs)?,
            lr: learning_rate(&self.lr)?,
            batch_size: positive_count("batch_size", &self.batch_size)?,
            grad_accum_steps: positive_count("grad_accum_steps", &self.grad_accum_steps)?,
            max_seq_len: positive_count("max_seq_len", &self.max_seq_len)?,
        })
    }
}

/// Evaluation inputs. `prompts` is newline separated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalForm {
    pub base_model: String,
    pub adapter_path: String,
    pub prompts: String,
}

impl Default for EvalForm {
    fn default() -> Self {
        Self {
            base_model: DEFAULT_BASE_MODEL.to_string(),
            adapter_path: DEFAULT_ADAPTER_PATH.to_string(),
            prompts: String::new(),
        }
    }
}

impl EvalForm {
    /// One prompt per non-blank line.
    pub fn prompt_list(&self) -> Vec<String> {
        self.prompts
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Builds an evaluation request. A blank adapter path falls back to
    /// `trained_adapter`, the path reported by the last training run.
    pub fn validate(&self, trained_adapter: Option<&str>) -> Result<EvalRequest, ValidationError> {
        let base_model = required("base_model", &self.base_model)?;
        let adapter_path = match self.adapter_path.trim() {
            "" => trained_adapter
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .ok_or_else(|| ValidationError::new("adapter_path", "is required"))?,
            path => path.to_string(),
        };
        let prompts = self.prompt_list();
        if prompts.is_empty() {
            return Err(ValidationError::new("prompts", "enter at least one prompt"));
        }

        Ok(EvalRequest { base_model, adapter_path, prompts })
    }
}

fn required(field: &'static str, raw: &str) -> Result<String, ValidationError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ValidationError::new(field, "is required"));
    }
    Ok(value.to_string())
}

fn positive_count(field: &'static str, raw: &str) -> Result<u32, ValidationError> {
    let value: u32 = raw
        .trim()
        .parse()
        .map_err(|_| ValidationError::new(field, format!("'{}' is not a whole number", raw.trim())))?;
    if value == 0 {
        return Err(ValidationError::new(field, "must be at least 1"));
    }
    Ok(value)
}

fn learning_rate(raw: &str) -> Result<f64, ValidationError> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ValidationError::new("lr", format!("'{}' is not a number", raw.trim())))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(ValidationError::new("lr", "must be greater than 0"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_form_validates() {
        let config = TrainForm::default().validate().unwrap();
        assert_eq!(config.base_model, DEFAULT_BASE_MODEL);
        assert_eq!(config.lora_type, LoraType::QLora);
        assert_eq!(config.num_epochs, 1);
        assert!((config.lr - 0.0002).abs() < f64::EPSILON);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.grad_accum_steps, 4);
        assert_eq!(config.max_seq_len, 2048);
    }

    #[test]
    fn test_non_numeric_field_is_rejected() {
        let mut form = TrainForm::default();
        form.set(TrainField::BatchSize, "two");
        let err = form.validate().unwrap_err();
        assert_eq!(err.field, "batch_size");

        let mut form = TrainForm::default();
        form.lr = "fast".to_string();
        assert_eq!(form.validate().unwrap_err().field, "lr");
    }

    #[test]
    fn test_zero_and_negative_values_are_rejected() {
        let mut form = TrainForm::default();
        form.num_epochs = "0".to_string();
        assert_eq!(form.validate().unwrap_err().message, "must be at least 1");

        let mut form = TrainForm::default();
        form.lr = "-1e-4".to_string();
        assert_eq!(form.validate().unwrap_err().field, "lr");

        let mut form = TrainForm::default();
        form.max_seq_len = "-5".to_string();
        assert_eq!(form.validate().unwrap_err().field, "max_seq_len");
    }

    #[test]
    fn test_lora_type_and_model_checks() {
        let mut form = TrainForm::default();
        form.lora_type = "LoRA".to_string();
        assert_eq!(form.validate().unwrap().lora_type, LoraType::Lora);

        form.lora_type = "full".to_string();
        assert_eq!(form.validate().unwrap_err().field, "lora_type");

        let mut form = TrainForm::default();
        form.base_model = "  ".to_string();
        assert_eq!(form.validate().unwrap_err().field, "base_model");
    }

    #[test]
    fn test_field_accessors_cover_all_fields() {
        let mut form = TrainForm::default();
        for field in TrainField::ALL {
            form.set(field, field.label());
            assert_eq!(form.get(field), field.label());
        }
    }

    #[test]
    fn test_eval_prompts_skip_blank_lines() {
        let form = EvalForm { prompts: "first\r\n\n   \nsecond\n".to_string(), ..EvalForm::default() };
        assert_eq!(form.prompt_list(), vec!["first", "second"]);

        let request = form.validate(None).unwrap();
        assert_eq!(request.adapter_path, DEFAULT_ADAPTER_PATH);
        assert_eq!(request.prompts.len(), 2);
    }

    #[test]
    fn test_eval_adapter_falls_back_to_trained_adapter() {
        let form = EvalForm { adapter_path: String::new(), prompts: "hi".to_string(), ..EvalForm::default() };
        assert_eq!(form.validate(Some("runs/adapter-7")).unwrap().adapter_path, "runs/adapter-7");
        assert_eq!(form.validate(None).unwrap_err().field, "adapter_path");
    }

    #[test]
    fn test_eval_requires_prompts() {
        let form = EvalForm::default();
        assert_eq!(form.validate(None).unwrap_err().field, "prompts");
    }
}
