use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

/// XLM-R pad token id.
const PAD_ID: u32 = 1;

/// Encode `texts` into `[B, max_len]` id and mask tensors, truncating or
/// padding every row to exactly `max_len` tokens.
pub fn tokenize_batch_on_device(
    tokenizer: &Tokenizer,
    texts: &[String],
    max_len: usize,
    device: &Device,
) -> Result<(Tensor, Tensor)> {
    let mut ids = Vec::with_capacity(texts.len() * max_len);
    let mut mask = Vec::with_capacity(texts.len() * max_len);
    for text in texts {
        let enc = tokenizer.encode(text.as_str(), true).map_err(|e| anyhow!("Tokenization failed: {e}"))?;
        let (row_ids, row_mask) = pad_row(enc.get_ids(), enc.get_attention_mask(), max_len);
        ids.extend(row_ids);
        mask.extend(row_mask);
    }
    let input_ids = Tensor::from_iter(ids, device)?.reshape((texts.len(), max_len))?;
    let attention_mask = Tensor::from_iter(mask, device)?.reshape((texts.len(), max_len))?;
    Ok((input_ids, attention_mask))
}

/// Truncate or right-pad one encoded row to `max_len`.
pub fn pad_row(ids: &[u32], mask: &[u32], max_len: usize) -> (Vec<u32>, Vec<u32>) {
    let mut ids = ids.to_vec();
    let mut mask = mask.to_vec();
    ids.truncate(max_len);
    mask.truncate(max_len);
    let pad = max_len - ids.len();
    ids.extend(std::iter::repeat(PAD_ID).take(pad));
    mask.extend(std::iter::repeat(0).take(pad));
    (ids, mask)
}
