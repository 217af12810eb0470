use crate::models::TokenRecord;

// Token for the `index`-th visit of a batch: plain `index mod len`.
pub fn token_for_visit(tokens: &[TokenRecord], index: usize) -> Option<&TokenRecord> {
    if tokens.is_empty() {
        return None;
    }
    tokens.get(index % tokens.len())
}

// Distinct tokens a batch of `count` visits touches.
pub fn tokens_used(token_count: usize, count: usize) -> usize {
    token_count.min(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(n: usize) -> Vec<TokenRecord> {
        (0..n)
            .map(|i| TokenRecord {
                token: format!("tok-{}", i),
                region: "X".to_string(),
                account_id: None,
                nickname: None,
                claims_verified: false,
            })
            .collect()
    }

    #[test]
    fn selection_is_index_mod_len() {
        let tokens = records(3);
        let picked: Vec<&str> = (0..7)
            .map(|i| token_for_visit(&tokens, i).map(|t| t.token.as_str()).unwrap_or(""))
            .collect();
        assert_eq!(
            picked,
            vec!["tok-0", "tok-1", "tok-2", "tok-0", "tok-1", "tok-2", "tok-0"]
        );
    }

    #[test]
    fn empty_pool_selects_nothing() {
        assert!(token_for_visit(&[], 0).is_none());
    }

    #[test]
    fn tokens_used_is_bounded_by_both_sides() {
        assert_eq!(tokens_used(10, 3), 3);
        assert_eq!(tokens_used(2, 50), 2);
        assert_eq!(tokens_used(0, 5), 0);
    }
}
