//! Field presence scanning
//!
//! Leaf utility behind the analysis engine: answers "which of these
//! messages carry a value for field N" without mutating anything.

use serde::{Deserialize, Serialize};

use crate::messages::{Message, MessageKind};

/// Presence of one field across a set of messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Coverage {
    /// Messages carrying the field.
    pub present: usize,
    /// Messages inspected.
    pub total: usize,
}

impl Coverage {
    /// Percentage of messages carrying the field; 0 for an empty set.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            100.0 * self.present as f64 / self.total as f64
        }
    }

    /// True when every inspected message carries the field.
    ///
    /// An empty set is not complete: downstream readiness checks require
    /// actual samples, not the absence of them.
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.present == self.total
    }

    pub fn absent(&self) -> usize {
        self.total - self.present
    }
}

/// Does the message carry values for all listed fields?
pub fn has_all(msg: &Message, numbers: &[u8]) -> bool {
    numbers.iter().all(|n| msg.has_field(*n))
}

/// Coverage of one field across all messages of a category.
pub fn coverage(messages: &[Message], kind: MessageKind, number: u8) -> Coverage {
    let mut cov = Coverage::default();
    for msg in messages.iter().filter(|m| m.kind == kind) {
        cov.total += 1;
        if msg.has_field(number) {
            cov.present += 1;
        }
    }
    cov
}

/// True when any message of the category carries the field.
pub fn any_has(messages: &[Message], kind: MessageKind, number: u8) -> bool {
    messages
        .iter()
        .filter(|m| m.kind == kind)
        .any(|m| m.has_field(number))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{record, FieldValue};

    fn record_with_distance(d: f64) -> Message {
        Message::new(MessageKind::Record).with_field(record::DISTANCE, FieldValue::Float(d))
    }

    #[test]
    fn test_coverage_counts_sum_to_total() {
        let msgs = vec![
            record_with_distance(1.0),
            Message::new(MessageKind::Record),
            record_with_distance(2.0),
            Message::new(MessageKind::Lap),
        ];
        let cov = coverage(&msgs, MessageKind::Record, record::DISTANCE);
        assert_eq!(cov.total, 3);
        assert_eq!(cov.present, 2);
        assert_eq!(cov.present + cov.absent(), cov.total);
    }

    #[test]
    fn test_coverage_percent_empty_is_zero() {
        let cov = coverage(&[], MessageKind::Record, record::DISTANCE);
        assert_eq!(cov.percent(), 0.0);
        assert!(!cov.is_complete());
    }

    #[test]
    fn test_full_coverage_is_complete() {
        let msgs = vec![record_with_distance(1.0), record_with_distance(2.0)];
        let cov = coverage(&msgs, MessageKind::Record, record::DISTANCE);
        assert!(cov.is_complete());
        assert_eq!(cov.percent(), 100.0);
    }

    #[test]
    fn test_has_all() {
        let msg = record_with_distance(5.0).with_field(record::SPEED, FieldValue::Float(3.0));
        assert!(has_all(&msg, &[record::DISTANCE, record::SPEED]));
        assert!(!has_all(&msg, &[record::DISTANCE, record::ALTITUDE]));
    }

    #[test]
    fn test_any_has_respects_kind() {
        let msgs = vec![
            Message::new(MessageKind::Lap).with_field(record::DISTANCE, FieldValue::Float(9.0)),
        ];
        assert!(!any_has(&msgs, MessageKind::Record, record::DISTANCE));
        assert!(any_has(&msgs, MessageKind::Lap, record::DISTANCE));
    }
}
