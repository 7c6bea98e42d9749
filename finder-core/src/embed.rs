//! Sentence embeddings.
//!
//! The engine depends only on the `Embedder` trait; the default
//! implementation runs a BERT-family model through candle with mean pooling
//! and L2 normalization. Without any embedder the engine still answers
//! queries lexically and every content file downgrades to metadata-only.

use crate::error::Result;

pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;
    /// One normalized vector per input text, in order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text])?;
        Ok(vectors.pop().unwrap_or_default())
    }
}

#[cfg(feature = "semantic")]
pub use bert::BertEmbedder;

#[cfg(feature = "semantic")]
mod bert {
    use super::Embedder;
    use crate::config::Settings;
    use crate::error::{FinderError, Result};
    use candle_core::{DType, Device, Tensor};
    use candle_nn::VarBuilder;
    use candle_transformers::models::bert::{BertModel, Config as BertConfig};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tokenizers::Tokenizer as HfTokenizer;

    /// Batches are kept modest so a per-batch failure loses little work.
    const BATCH_SIZE: usize = 16;
    /// BERT positional ceiling; longer inputs are truncated by the tokenizer.
    const MAX_SEQ_LEN: usize = 512;

    pub struct BertEmbedder {
        // candle tensors are not Sync; the engine shares the embedder across
        // search and indexing threads
        model: Mutex<BertModel>,
        tokenizer: HfTokenizer,
        device: Device,
        dim: usize,
        device_name: &'static str,
    }

    impl BertEmbedder {
        /// Load from `settings.model_dir`, or from the HuggingFace cache.
        /// Offline mode forbids any hub download.
        pub fn load(settings: &Settings) -> Result<BertEmbedder> {
            if settings.offline {
                // hf-hub honors this and serves from cache only
                std::env::set_var("HF_HUB_OFFLINE", "1");
            }
            let (config_path, tokenizer_path, weights_path) = match &settings.model_dir {
                Some(dir) => (
                    dir.join("config.json"),
                    dir.join("tokenizer.json"),
                    dir.join("model.safetensors"),
                ),
                None => hub_files(&settings.embedding_model)?,
            };

            let (device, device_name) = select_device();
            tracing::debug!("loading embedding model on {device_name}");

            let config_text = std::fs::read_to_string(&config_path)
                .map_err(|e| FinderError::Embedding(format!("model config: {e}")))?;
            let config: BertConfig = serde_json::from_str(&config_text)
                .map_err(|e| FinderError::Embedding(format!("model config: {e}")))?;

            let mut tokenizer = HfTokenizer::from_file(&tokenizer_path)
                .map_err(|e| FinderError::Embedding(format!("tokenizer: {e}")))?;
            let truncation = tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            };
            tokenizer
                .with_truncation(Some(truncation))
                .map_err(|e| FinderError::Embedding(format!("tokenizer: {e}")))?;

            let vb = unsafe {
                VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)
                    .map_err(|e| FinderError::Embedding(format!("model weights: {e}")))?
            };
            let model = BertModel::load(vb, &config)
                .map_err(|e| FinderError::Embedding(format!("model load: {e}")))?;

            Ok(BertEmbedder {
                model: Mutex::new(model),
                tokenizer,
                device,
                dim: config.hidden_size,
                device_name,
            })
        }

        pub fn device_name(&self) -> &'static str {
            self.device_name
        }

        fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let encodings = self
                .tokenizer
                .encode_batch(texts.to_vec(), true)
                .map_err(|e| FinderError::Embedding(format!("tokenization: {e}")))?;

            let max_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);
            let batch = texts.len();

            let mut all_ids: Vec<u32> = Vec::with_capacity(batch * max_len);
            let mut all_mask: Vec<f32> = Vec::with_capacity(batch * max_len);
            let mut all_type_ids: Vec<u32> = Vec::with_capacity(batch * max_len);
            for enc in &encodings {
                let ids = enc.get_ids();
                let mask = enc.get_attention_mask();
                let type_ids = enc.get_type_ids();
                let pad = max_len - ids.len();
                all_ids.extend_from_slice(ids);
                all_ids.extend(std::iter::repeat(0).take(pad));
                all_mask.extend(mask.iter().map(|&m| m as f32));
                all_mask.extend(std::iter::repeat(0.0).take(pad));
                all_type_ids.extend_from_slice(type_ids);
                all_type_ids.extend(std::iter::repeat(0).take(pad));
            }

            let err = |e: candle_core::Error| FinderError::Embedding(e.to_string());
            let input_ids = Tensor::from_vec(all_ids, (batch, max_len), &self.device).map_err(err)?;
            let attention_mask =
                Tensor::from_vec(all_mask, (batch, max_len), &self.device).map_err(err)?;
            let token_type_ids =
                Tensor::from_vec(all_type_ids, (batch, max_len), &self.device).map_err(err)?;

            let model = self
                .model
                .lock()
                .map_err(|_| FinderError::Embedding("model lock poisoned".to_string()))?;
            let output = model
                .forward(&input_ids, &token_type_ids, Some(&attention_mask))
                .map_err(err)?;
            drop(model);

            // mean pooling over real tokens, then L2 normalization
            let mask_expanded = attention_mask
                .unsqueeze(2)
                .map_err(err)?
                .broadcast_as(output.shape())
                .map_err(err)?;
            let summed = output.mul(&mask_expanded).map_err(err)?.sum(1).map_err(err)?;
            let counts = mask_expanded
                .sum(1)
                .map_err(err)?
                .clamp(1e-9, f64::MAX)
                .map_err(err)?;
            let mean = summed.div(&counts).map_err(err)?;

            let norms = mean
                .sqr()
                .map_err(err)?
                .sum_keepdim(1)
                .map_err(err)?
                .sqrt()
                .map_err(err)?
                .broadcast_as(mean.shape())
                .map_err(err)?
                .clamp(1e-9, f64::MAX)
                .map_err(err)?;
            let normalized = mean.div(&norms).map_err(err)?;

            let flat: Vec<f32> = normalized
                .flatten_all()
                .map_err(err)?
                .to_vec1()
                .map_err(err)?;
            let dim = flat.len() / batch;
            Ok(flat.chunks(dim).map(|c| c.to_vec()).collect())
        }
    }

    impl Embedder for BertEmbedder {
        fn dimension(&self) -> usize {
            self.dim
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            let mut out = Vec::with_capacity(texts.len());
            for batch in texts.chunks(BATCH_SIZE) {
                out.extend(self.encode_batch(batch)?);
            }
            Ok(out)
        }
    }

    fn hub_files(model_id: &str) -> Result<(PathBuf, PathBuf, PathBuf)> {
        use hf_hub::{api::sync::Api, Repo, RepoType};
        let api = Api::new().map_err(|e| FinderError::Embedding(format!("model hub: {e}")))?;
        let repo = api.repo(Repo::with_revision(
            model_id.to_string(),
            RepoType::Model,
            "main".to_string(),
        ));
        let get = |name: &str| {
            repo.get(name)
                .map_err(|e| FinderError::Embedding(format!("model file {name}: {e}")))
        };
        Ok((get("config.json")?, get("tokenizer.json")?, get("model.safetensors")?))
    }

    /// CUDA first, then Metal, then CPU.
    fn select_device() -> (Device, &'static str) {
        #[cfg(feature = "cuda")]
        {
            match Device::new_cuda(0) {
                Ok(device) => return (device, "cuda"),
                Err(e) => tracing::warn!("cuda unavailable ({e}); trying next device"),
            }
        }
        #[cfg(feature = "metal")]
        {
            match Device::new_metal(0) {
                Ok(device) => return (device, "metal"),
                Err(e) => tracing::warn!("metal unavailable ({e}); falling back to cpu"),
            }
        }
        (Device::Cpu, "cpu")
    }
}
