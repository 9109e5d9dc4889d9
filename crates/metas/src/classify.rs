//! Record classifier: labels a description as detail, subtotal or total.
//!
//! Rules (case-insensitive):
//! - subtotal: contains `subtotal`, `sub-total`, or `sub` and `total` split by a space or tab
//! - total: contains `total` as a distinct word with a space or tab on at least
//!   one side, and that word is not the tail of a subtotal phrase
//!
//! `SubTotal Operarios (B)` is therefore a subtotal only, while
//! `TOTAL FORMACION TITULADA (F = D+E)` is a total.

use crate::model::{Classification, HierarchyLevel};

const SUBTOTAL_MARKERS: [&str; 4] = ["subtotal", "sub total", "sub\ttotal", "sub-total"];
const TOTAL_WORD: &str = "total";

/// Classify a raw description. Never fails; unrecognized text is detail.
pub fn classify(description: &str) -> Classification {
    let lower = description.to_lowercase();
    let is_subtotal = SUBTOTAL_MARKERS.iter().any(|m| lower.contains(m));
    let is_total = has_total_word(&lower);

    Classification {
        is_subtotal,
        is_total,
        level: HierarchyLevel::from_flags(is_subtotal, is_total),
    }
}

/// Hierarchy level only.
pub fn level_of(description: &str) -> HierarchyLevel {
    classify(description).level
}

fn has_total_word(lower: &str) -> bool {
    lower.match_indices(TOTAL_WORD).any(|(idx, _)| {
        let head = &lower[..idx];
        let tail = &lower[idx + TOTAL_WORD.len()..];
        let before = head.chars().next_back();
        let after = tail.chars().next();

        let bounded = before.map_or(true, |c| !c.is_alphanumeric())
            && after.map_or(true, |c| !c.is_alphanumeric());
        let spaced = before.map_or(false, is_blank) || after.map_or(false, is_blank);

        bounded && spaced && !is_subtotal_tail(head)
    })
}

/// True when the text right before a `total` word is a separate `sub` word
/// (`sub total`, `sub-total`).
fn is_subtotal_tail(head: &str) -> bool {
    let Some(rest) = head
        .strip_suffix(' ')
        .or_else(|| head.strip_suffix('\t'))
        .or_else(|| head.strip_suffix('-'))
    else {
        return false;
    };
    let Some(before_sub) = rest.strip_suffix("sub") else {
        return false;
    };
    before_sub
        .chars()
        .next_back()
        .map_or(true, |c| !c.is_alphanumeric())
}

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(s: &str) -> (bool, bool) {
        let c = classify(s);
        (c.is_subtotal, c.is_total)
    }

    #[test]
    fn detail_rows() {
        assert_eq!(flags("Operarios Regular"), (false, false));
        assert_eq!(flags("Profundización Técnica (T)"), (false, false));
        assert_eq!(level_of("Tecnólogos Regular - Virtual"), HierarchyLevel::Detail);
    }

    #[test]
    fn subtotal_is_not_also_total() {
        assert_eq!(flags("SubTotal Operarios (B)"), (true, false));
        assert_eq!(flags("SubTotal Tecnólogos ( E)"), (true, false));
        assert_eq!(flags("Sub Total Auxiliares"), (true, false));
        assert_eq!(flags("sub-total técnico laboral"), (true, false));
        assert_eq!(level_of("SubTotal Programa de Bilinguísmo (K = I + J)"), HierarchyLevel::Subtotal);
    }

    #[test]
    fn total_rows() {
        assert_eq!(flags("TOTAL FORMACION TITULADA (F = D+E)"), (false, true));
        assert_eq!(flags("Gran total"), (false, true));
        assert_eq!(level_of("TOTAL FORMACION PROFESIONAL INTEGRAL (O=N+F)"), HierarchyLevel::Total);
    }

    #[test]
    fn tabs_count_as_boundaries() {
        assert_eq!(flags("\tTotal"), (false, true));
        assert_eq!(flags("Total\tcupos"), (false, true));
        assert_eq!(flags("\tSubTotal Operarios\t"), (true, false));
        assert_eq!(flags("Sub\tTotal Operarios"), (true, false));
        assert_eq!(level_of("Sub\tTotal Operarios"), HierarchyLevel::Subtotal);
    }

    #[test]
    fn embedded_total_is_not_a_word() {
        assert_eq!(flags("Totalizador regional"), (false, false));
        assert_eq!(flags("Cupos totales"), (false, false));
        assert_eq!(flags("Subtotales"), (true, false));
    }

    #[test]
    fn bare_total_needs_a_blank_neighbour() {
        // Matches the source heuristic: a lone word without blanks is not flagged.
        assert_eq!(flags("Total"), (false, false));
        assert_eq!(flags("(total)"), (false, false));
    }

    #[test]
    fn subtotal_and_separate_total_word() {
        // Both phrases present: the total word wins the level.
        let c = classify("Subtotal y total general");
        assert!(c.is_subtotal);
        assert!(c.is_total);
        assert_eq!(c.level, HierarchyLevel::Total);
    }

    #[test]
    fn sub_must_be_its_own_word() {
        // "club total" is not a subtotal phrase.
        assert_eq!(flags("Club total"), (false, true));
    }
}
