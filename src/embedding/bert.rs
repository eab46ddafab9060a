use candle::{DType, Device, Result, Tensor};
use candle_core as candle;
use candle_transformers::models::bert::{BertModel, Config};
use std::path::Path;

/// Mean-pooled BERT sentence encoder (sentence-transformers layout).
///
/// Expects `config.json` and `model.safetensors` in `model_dir`.
pub struct BertSentenceEncoder {
    bert: BertModel,
    hidden_size: usize,
}

impl BertSentenceEncoder {
    pub fn load<P: AsRef<Path>>(model_dir: P, device: &Device) -> Result<Self> {
        let model_dir = model_dir.as_ref();
        let config_path = model_dir.join("config.json");
        let weights_path = model_dir.join("model.safetensors");

        let config_content = std::fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)
            .map_err(|e| candle::Error::Msg(format!("Failed to parse config: {}", e)))?;

        let vb = unsafe {
            candle_nn::VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, device)?
        };

        let bert = if vb.contains_tensor("bert.embeddings.word_embeddings.weight") {
            BertModel::load(vb.pp("bert"), &config)?
        } else {
            BertModel::load(vb, &config)?
        };

        Ok(Self {
            bert,
            hidden_size: config.hidden_size,
        })
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Encodes one tokenized text of shape `[1, seq_len]` into a `[hidden_size]` vector.
    pub fn encode(&self, input_ids: &Tensor) -> Result<Vec<f32>> {
        let token_type_ids = input_ids.zeros_like()?;
        let attention_mask = input_ids.ones_like()?;
        let hidden = self
            .bert
            .forward(input_ids, &token_type_ids, Some(&attention_mask))?;

        // [1, seq, hidden] -> [hidden]
        hidden.mean(1)?.squeeze(0)?.to_dtype(DType::F32)?.to_vec1::<f32>()
    }
}
