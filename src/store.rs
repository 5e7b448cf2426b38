use std::collections::BTreeMap;
use std::fmt::Display;

use parking_lot::RwLock;

/// Identity of a submitted equation. Ids are assigned by the store and
/// increase monotonically from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EquationId(u64);

impl EquationId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl Display for EquationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where an equation is in its life: queued on submission, computing once
/// the evaluator picks it up, then exactly one terminal state.
#[derive(Debug, Clone, PartialEq)]
pub enum EquationStatus {
    Queued,
    Computing,
    Computed(f64),
    Error(String),
}

impl EquationStatus {
    /// Terminal states are never followed by another transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EquationStatus::Computed(_) | EquationStatus::Error(_))
    }
}

impl Display for EquationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EquationStatus::Queued => write!(f, "In queue"),
            EquationStatus::Computing => write!(f, "Computing"),
            EquationStatus::Computed(value) => write!(f, "Computed {value}"),
            EquationStatus::Error(message) => write!(f, "Error {message}"),
        }
    }
}

/// A stored equation: the submitted text plus its current status.
#[derive(Debug, Clone, PartialEq)]
pub struct Equation {
    pub id: EquationId,
    pub text: String,
    pub status: EquationStatus,
}

/// Where equations live and where the evaluator writes its progress.
///
/// Injected as a trait object so the engine stays independent of the
/// actual storage; [`MemoryStore`] is the in-process form.
pub trait EquationStore: Send + Sync {
    /// Stores a new equation as [`EquationStatus::Queued`] and assigns it
    /// an id.
    fn insert(&self, text: &str) -> EquationId;

    /// The submitted text, if the id is known.
    fn text(&self, id: EquationId) -> Option<String>;

    /// Single-row status update; unknown ids are a no-op.
    fn set_status(&self, id: EquationId, status: EquationStatus);

    fn get(&self, id: EquationId) -> Option<Equation>;

    /// Every equation, in submission order.
    fn list(&self) -> Vec<Equation>;
}

/// In-memory [`EquationStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    rows: BTreeMap<EquationId, Row>,
    next_id: u64,
}

#[derive(Debug, Clone)]
struct Row {
    text: String,
    status: EquationStatus,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EquationStore for MemoryStore {
    fn insert(&self, text: &str) -> EquationId {
        let mut inner = self.inner.write();
        inner.next_id += 1;
        let id = EquationId(inner.next_id);
        inner.rows.insert(
            id,
            Row { text: text.to_string(), status: EquationStatus::Queued },
        );
        id
    }

    fn text(&self, id: EquationId) -> Option<String> {
        self.inner.read().rows.get(&id).map(|row| row.text.clone())
    }

    fn set_status(&self, id: EquationId, status: EquationStatus) {
        if let Some(row) = self.inner.write().rows.get_mut(&id) {
            row.status = status;
        }
    }

    fn get(&self, id: EquationId) -> Option<Equation> {
        self.inner.read().rows.get(&id).map(|row| Equation {
            id,
            text: row.text.clone(),
            status: row.status.clone(),
        })
    }

    fn list(&self) -> Vec<Equation> {
        self.inner
            .read()
            .rows
            .iter()
            .map(|(&id, row)| Equation {
                id,
                text: row.text.clone(),
                status: row.status.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_assigns_increasing_ids_and_queues() {
        let store = MemoryStore::new();
        let a = store.insert("1+1");
        let b = store.insert("2+2");
        assert!(a < b);
        assert_eq!(a.get(), 1);
        assert_eq!(store.text(a).as_deref(), Some("1+1"));
        assert_eq!(store.get(b).unwrap().status, EquationStatus::Queued);
    }

    #[test]
    fn status_updates_touch_one_row() {
        let store = MemoryStore::new();
        let a = store.insert("1+1");
        let b = store.insert("2*2");
        store.set_status(a, EquationStatus::Computed(2.0));
        assert_eq!(store.get(a).unwrap().status, EquationStatus::Computed(2.0));
        assert_eq!(store.get(b).unwrap().status, EquationStatus::Queued);
    }

    #[test]
    fn unknown_ids_read_as_none_and_update_as_noop() {
        let store = MemoryStore::new();
        store.insert("5");
        let stranger = EquationId(99);
        assert_eq!(store.text(stranger), None);
        assert_eq!(store.get(stranger), None);
        store.set_status(stranger, EquationStatus::Computing);
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn list_preserves_submission_order() {
        let store = MemoryStore::new();
        for text in ["1", "2", "3"] {
            store.insert(text);
        }
        let texts: Vec<_> = store.list().into_iter().map(|equation| equation.text).collect();
        assert_eq!(texts, ["1", "2", "3"]);
    }

    #[test]
    fn status_display_strings() {
        assert_eq!(EquationStatus::Queued.to_string(), "In queue");
        assert_eq!(EquationStatus::Computing.to_string(), "Computing");
        assert_eq!(EquationStatus::Computed(14.0).to_string(), "Computed 14");
        assert_eq!(
            EquationStatus::Error("Division by zero".into()).to_string(),
            "Error Division by zero"
        );
        assert!(EquationStatus::Computed(0.0).is_terminal());
        assert!(!EquationStatus::Computing.is_terminal());
    }
}
