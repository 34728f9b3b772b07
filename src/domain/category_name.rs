use std::fmt::Write;

/// Maps a category display name to the key fragment the host uses for its
/// color preference: lowercased, with every character outside `[a-z0-9 _-]`
/// written as `-ux<hex>-`.
pub fn encode_category_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let mut encoded = String::with_capacity(lowered.len());

    for ch in lowered.chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, ' ' | '-' | '_') {
            encoded.push(ch);
        } else {
            let _ = write!(encoded, "-ux{:x}-", ch as u32);
        }
    }

    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn plain_ascii_is_lowercased_only() {
        assert_eq!(encode_category_name("Auslieferung"), "auslieferung");
        assert_eq!(encode_category_name("Team Sync_2-B"), "team sync_2-b");
    }

    #[test]
    fn non_ascii_characters_are_escaped() {
        assert_eq!(encode_category_name("Rückgabe"), "r-uxfc-ckgabe");
        assert_eq!(encode_category_name("Rücknahme"), "r-uxfc-cknahme");
    }

    #[test]
    fn punctuation_is_escaped_without_padding() {
        assert_eq!(encode_category_name("a.b"), "a-ux2e-b");
        assert_eq!(encode_category_name("x,y"), "x-ux2c-y");
    }

    #[test]
    fn astral_characters_are_escaped_per_code_point() {
        assert_eq!(encode_category_name("🎉"), "-ux1f389-");
    }

    #[test]
    fn empty_name_encodes_to_empty_key() {
        assert_eq!(encode_category_name(""), "");
    }

    proptest! {
        #[test]
        fn encoding_is_deterministic(name in "\\PC{0,24}") {
            prop_assert_eq!(encode_category_name(&name), encode_category_name(&name));
        }

        #[test]
        fn encoded_key_contains_only_safe_characters(name in "\\PC{0,24}") {
            let encoded = encode_category_name(&name);
            let safe = encoded.chars().all(|ch| {
                ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, ' ' | '-' | '_')
            });
            prop_assert!(safe, "unsafe character in {}", encoded);
        }

        #[test]
        fn distinct_escaped_characters_do_not_collide(
            left in proptest::char::any(),
            right in proptest::char::any(),
        ) {
            let left_lower = left.to_lowercase().collect::<String>();
            let right_lower = right.to_lowercase().collect::<String>();
            prop_assume!(left_lower != right_lower);
            prop_assert_ne!(
                encode_category_name(&left.to_string()),
                encode_category_name(&right.to_string())
            );
        }
    }
}
