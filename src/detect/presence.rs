use super::result::Detection;

/// Class label that arms auto-recording unless configured otherwise.
pub const DEFAULT_TARGET_LABEL: &str = "person";

/// True when any detection carries exactly `label` (case-sensitive).
pub fn target_present(detections: &[Detection], label: &str) -> bool {
    detections.iter().any(|d| d.label == label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    fn det(label: &str) -> Detection {
        Detection::new(label, 0.9, BoundingBox::new(0.0, 0.0, 1.0, 1.0))
    }

    #[test]
    fn any_match_counts_even_when_not_last() {
        let detections = vec![det("person"), det("dog")];
        assert!(target_present(&detections, "person"));
    }

    #[test]
    fn label_match_is_exact() {
        assert!(!target_present(&[det("Person")], "person"));
        assert!(!target_present(&[det("persons")], "person"));
        assert!(!target_present(&[], "person"));
    }
}
