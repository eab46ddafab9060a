use std::path::Path;

use candle_core::{Device, Tensor};
use parking_lot::Mutex;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::dataset::Sample;
use crate::embedding::device::select_device;
use crate::embedding::utils::load_tokenizer;

use super::error::{GenerationError, GenerationResult};
use super::model::Qwen2ForCausalLM;
use super::types::{AttentionStep, GenerationOptions, GenerationOutput};
use super::{Generator, argmax};

/// Upper bound on prompt plus generated tokens.
pub const DEFAULT_CONTEXT_WINDOW: usize = 4096;

const EOS_TOKENS: [&str; 4] = ["<|endoftext|>", "<|im_end|>", "</s>", "<eos>"];

/// Greedy-decoding generator over a Qwen2 GGUF checkpoint.
///
/// `tokenizer.json` must sit beside the model file. Samples of a batch are decoded
/// one after another (batched decoding would need padding).
pub struct CandleGenerator {
    model_id: String,
    model: Mutex<Qwen2ForCausalLM>,
    tokenizer: Tokenizer,
    eos_token_ids: Vec<u32>,
    device: Device,
}

impl std::fmt::Debug for CandleGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleGenerator")
            .field("model_id", &self.model_id)
            .field("device", &format!("{:?}", self.device))
            .field("eos_token_ids", &self.eos_token_ids)
            .finish()
    }
}

impl CandleGenerator {
    pub fn load(model_path: &Path) -> GenerationResult<Self> {
        let model_id = model_path.display().to_string();

        if !model_path.is_file() {
            return Err(GenerationError::ModelNotFound {
                path: model_path.to_path_buf(),
            });
        }

        let device = select_device();
        debug!(?device, "Selected compute device for generation");

        let tokenizer =
            load_tokenizer(model_path).map_err(|e| GenerationError::ModelLoadFailed {
                model: model_id.clone(),
                reason: format!("Failed to load tokenizer: {}", e),
            })?;

        let eos_token_ids: Vec<u32> = EOS_TOKENS
            .iter()
            .filter_map(|token| tokenizer.token_to_id(token))
            .collect();
        if eos_token_ids.is_empty() {
            return Err(GenerationError::ModelLoadFailed {
                model: model_id,
                reason: "tokenizer defines no end-of-sequence token".to_string(),
            });
        }

        let mut model_file =
            std::fs::File::open(model_path).map_err(|e| GenerationError::ModelLoadFailed {
                model: model_id.clone(),
                reason: e.to_string(),
            })?;
        let content = candle_core::quantized::gguf_file::Content::read(&mut model_file).map_err(
            |e| GenerationError::ModelLoadFailed {
                model: model_id.clone(),
                reason: format!("Failed to read GGUF content: {}", e),
            },
        )?;

        let model =
            Qwen2ForCausalLM::from_gguf(content, &mut model_file, &device, DEFAULT_CONTEXT_WINDOW)
                .map_err(|e| GenerationError::ModelLoadFailed {
                    model: model_id.clone(),
                    reason: format!("Failed to load Qwen2 model: {}", e),
                })?;

        info!(
            model_path = %model_path.display(),
            hidden_size = model.config().hidden_size,
            num_layers = model.config().num_layers,
            vocab_size = model.config().vocab_size,
            context_window = model.context_window(),
            "Generation model loaded"
        );

        Ok(Self {
            model_id,
            model: Mutex::new(model),
            tokenizer,
            eos_token_ids,
            device,
        })
    }

    fn generate_one(
        &self,
        model: &Qwen2ForCausalLM,
        sample: &Sample,
        options: &GenerationOptions,
    ) -> GenerationResult<GenerationOutput> {
        let prompt = sample.prompt_text();
        let encoding =
            self.tokenizer
                .encode(prompt.as_str(), true)
                .map_err(|e| GenerationError::TokenizationFailed {
                    reason: e.to_string(),
                })?;
        let input_ids = encoding.get_ids().to_vec();

        if input_ids.len() + options.max_new_tokens > model.context_window() {
            return Err(GenerationError::PromptTooLong {
                tokens: input_ids.len(),
                max_new_tokens: options.max_new_tokens,
                context_window: model.context_window(),
            });
        }

        let num_layers = model.config().num_layers;
        let num_heads = model.config().num_attention_heads;

        let mut tokens = input_ids.clone();
        let mut generated_ids = Vec::new();
        let mut scores = Vec::new();
        let mut attentions = Vec::new();

        for _ in 0..options.max_new_tokens {
            let input = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
            let step = model.forward(&input, options.return_attentions)?;

            let next = argmax(&step.logits).ok_or_else(|| GenerationError::InferenceFailed {
                reason: "model produced no finite logits".to_string(),
            })? as u32;

            if self.eos_token_ids.contains(&next) {
                break;
            }

            if options.return_logits {
                scores.push(step.logits);
            }
            if let Some(weights) = step.attention {
                attentions.push(AttentionStep::new(num_layers, num_heads, weights)?);
            }

            generated_ids.push(next);
            tokens.push(next);
        }

        let generated_text = self
            .tokenizer
            .decode(&generated_ids, true)
            .map_err(|e| GenerationError::TokenizationFailed {
                reason: e.to_string(),
            })?
            .trim()
            .to_string();

        debug!(
            prompt_tokens = input_ids.len(),
            generated_tokens = generated_ids.len(),
            "Sample generated"
        );

        let output = GenerationOutput::new(prompt, input_ids, generated_ids, generated_text, scores);
        Ok(if options.return_attentions {
            output.with_attentions(attentions)
        } else {
            output
        })
    }
}

impl Generator for CandleGenerator {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn supports_attentions(&self) -> bool {
        true
    }

    fn generate(
        &self,
        batch: &[Sample],
        options: &GenerationOptions,
    ) -> GenerationResult<Vec<GenerationOutput>> {
        let model = self.model.lock();
        batch
            .iter()
            .map(|sample| self.generate_one(&model, sample, options))
            .collect()
    }
}
