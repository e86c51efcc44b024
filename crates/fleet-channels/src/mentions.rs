//! Mention extraction (§4.5.3): the substring `@<memberId>` where
//! `<memberId>` is a current channel member, matched exactly so `@bob`
//! inside `@bobby` does not mention `bob`.

use std::collections::BTreeSet;

/// Returns the subset of `members` mentioned in `content` via `@member`.
pub fn extract_mentions<'a>(content: &str, members: &'a [String]) -> BTreeSet<&'a str> {
    let mut found = BTreeSet::new();
    for member in members {
        let needle = format!("@{member}");
        let mut search_from = 0;
        while let Some(offset) = content[search_from..].find(&needle) {
            let start = search_from + offset;
            let end = start + needle.len();
            let boundary_ok = content[end..]
                .chars()
                .next()
                .map(|c| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
                .unwrap_or(true);
            if boundary_ok {
                found.insert(member.as_str());
                break;
            }
            search_from = end;
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_exact_member_mention() {
        let members = vec!["bob".to_string(), "alice".to_string()];
        let found = extract_mentions("hey @bob can you check this?", &members);
        assert_eq!(found, BTreeSet::from(["bob"]));
    }

    #[test]
    fn avoids_prefix_false_positive() {
        let members = vec!["bob".to_string()];
        let found = extract_mentions("cc @bobby not bob", &members);
        assert!(found.is_empty());
    }

    #[test]
    fn matches_at_end_of_string() {
        let members = vec!["bob".to_string()];
        let found = extract_mentions("thanks @bob", &members);
        assert_eq!(found, BTreeSet::from(["bob"]));
    }

    #[test]
    fn matches_human_prefixed_member() {
        let members = vec!["human:operator".to_string()];
        let found = extract_mentions("paging @human:operator now", &members);
        assert_eq!(found, BTreeSet::from(["human:operator"]));
    }
}
