//! Final grounding check on selected evidence (C7): every evidence item's
//! bbox must be a real rectangle that intersects at least one span on its
//! page, otherwise the whole response is downgraded to insufficient
//! evidence rather than shipping an ungrounded box.

use pageproof_model::domain::{BBox, EvidenceItem, Span};

/// `true` if `item`'s bbox is non-degenerate and intersects at least one of
/// `page_spans` (spans already filtered to the item's page).
#[must_use]
pub fn evidence_item_is_grounded(item: &EvidenceItem, page_spans: &[Span]) -> bool {
    if item.bbox.is_degenerate() {
        return false;
    }
    page_spans.iter().any(|s| s.page_number == item.page && item.bbox.intersects(&s.bbox))
}

/// Validates every item in `items` against spans on its own page. Returns
/// `true` only if every item is grounded and at least one item is present.
#[must_use]
pub fn validate_all(items: &[EvidenceItem], spans_by_page: &dyn Fn(i32) -> Vec<Span>) -> bool {
    if items.is_empty() {
        return false;
    }
    items.iter().all(|item| evidence_item_is_grounded(item, &spans_by_page(item.page)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn span(page_number: i32, bbox: BBox) -> Span {
        Span {
            id: 1,
            document_id: Uuid::nil(),
            page_id: 1,
            page_number,
            span_index: 0,
            text: "word".to_string(),
            bbox,
            char_start: None,
            char_end: None,
        }
    }

    fn item(page: i32, bbox: BBox) -> EvidenceItem {
        EvidenceItem { page, text: "evidence".to_string(), bbox, page_width: None, page_height: None }
    }

    #[test]
    fn degenerate_bbox_is_not_grounded() {
        let degenerate = BBox { x1: 5.0, y1: 5.0, x2: 5.0, y2: 5.0 };
        let spans = vec![span(1, BBox { x1: 0.0, y1: 0.0, x2: 10.0, y2: 10.0 })];
        assert!(!evidence_item_is_grounded(&item(1, degenerate), &spans));
    }

    #[test]
    fn non_intersecting_bbox_is_not_grounded() {
        let far = BBox { x1: 100.0, y1: 100.0, x2: 110.0, y2: 110.0 };
        let spans = vec![span(1, BBox { x1: 0.0, y1: 0.0, x2: 10.0, y2: 10.0 })];
        assert!(!evidence_item_is_grounded(&item(1, far), &spans));
    }

    #[test]
    fn intersecting_bbox_is_grounded() {
        let overlap = BBox { x1: 5.0, y1: 5.0, x2: 15.0, y2: 15.0 };
        let spans = vec![span(1, BBox { x1: 0.0, y1: 0.0, x2: 10.0, y2: 10.0 })];
        assert!(evidence_item_is_grounded(&item(1, overlap), &spans));
    }

    #[test]
    fn validate_all_rejects_empty_set() {
        assert!(!validate_all(&[], &|_| Vec::new()));
    }

    #[test]
    fn validate_all_requires_every_item_grounded() {
        let good = item(1, BBox { x1: 0.0, y1: 0.0, x2: 10.0, y2: 10.0 });
        let bad = item(2, BBox { x1: 100.0, y1: 100.0, x2: 110.0, y2: 110.0 });
        let lookup = |page: i32| match page {
            1 => vec![span(1, BBox { x1: 0.0, y1: 0.0, x2: 10.0, y2: 10.0 })],
            _ => vec![span(2, BBox { x1: 0.0, y1: 0.0, x2: 1.0, y2: 1.0 })],
        };
        assert!(!validate_all(&[good, bad], &lookup));
    }
}
