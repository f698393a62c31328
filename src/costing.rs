use tiktoken_rs::cl100k_base;

const COST_PER_1K_TOKENS: f64 = 0.002;

/// Token count of the full transcript text under the `cl100k_base` encoding,
/// priced at a fixed per-1000-token rate. Recomputed from scratch on every
/// call.
pub fn tokens_info(transcript_text: &str) -> anyhow::Result<String> {
    let encoder = cl100k_base()?;
    let count = encoder.encode_ordinary(transcript_text).len();
    let cost = count as f64 / 1000.0 * COST_PER_1K_TOKENS;
    Ok(format!("Used tokens: {} ({:.5} USD)", count, cost))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_empty_text_costs_nothing() {
        assert_eq!(tokens_info("").unwrap(), "Used tokens: 0 (0.00000 USD)");
    }

    #[test]
    fn test_cost_is_formatted_to_five_decimals() {
        let info = tokens_info("hello world, how are you today?").unwrap();
        let open = info.find('(').unwrap();
        let close = info.find(" USD)").unwrap();
        let cost = &info[open + 1..close];
        assert_eq!(cost.split('.').nth(1).unwrap().len(), 5);
    }

    #[test]
    fn test_longer_text_costs_more() {
        let short = tokens_info("one sentence").unwrap();
        let long = tokens_info(&"one sentence ".repeat(100)).unwrap();
        let count = |s: &str| -> usize {
            s.strip_prefix("Used tokens: ")
                .unwrap()
                .split(' ')
                .next()
                .unwrap()
                .parse()
                .unwrap()
        };
        assert!(count(&long) > count(&short));
    }
}
