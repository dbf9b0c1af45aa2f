//! View and Content Queries
//!
//! A query exposes the results of looking up children of a component as a
//! read-only signal. The host resolves the query and writes the ordered
//! result set; components read it reactively.
//!
//! Results are stored as a shared `Rc<[T]>`. Writing a result set that is
//! structurally equal to the current one (same elements, same order) is a
//! no-op: the version does not move and readers keep the same instance.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::Rc;

use crate::error::{ReactiveError, RequiredKind};
use crate::graph::{NodeId, ReactiveNode};
use crate::reactive::Runtime;

/// Where a query looks for its results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryOrigin {
    /// The component's own template.
    View,
    /// Children projected into the component by its parent.
    Content,
}

struct QueryInner<T> {
    id: NodeId,
    name: String,
    origin: QueryOrigin,
    results: RefCell<Rc<[T]>>,
    resolved: Cell<bool>,
}

impl<T> Drop for QueryInner<T> {
    fn drop(&mut self) {
        Runtime::remove_node(self.id);
    }
}

impl<T: PartialEq + 'static> QueryInner<T> {
    fn new(name: String, origin: QueryOrigin) -> Rc<Self> {
        let label = format!("{name} ({})", origin_label(origin));
        let id = Runtime::register_node(ReactiveNode::signal(Some(label)));
        Rc::new(Self {
            id,
            name,
            origin,
            results: RefCell::new(Rc::from(Vec::new())),
            resolved: Cell::new(false),
        })
    }

    fn results(&self) -> Rc<[T]> {
        Runtime::track_read(self.id);
        Rc::clone(&self.results.borrow())
    }

    fn set_results(&self, results: Vec<T>) -> bool {
        self.resolved.set(true);
        if **self.results.borrow() == *results {
            tracing::trace!(query = %self.name, "query results unchanged");
            return false;
        }
        *self.results.borrow_mut() = Rc::from(results);
        Runtime::producer_changed(self.id);
        true
    }
}

fn origin_label(origin: QueryOrigin) -> &'static str {
    match origin {
        QueryOrigin::View => "view query",
        QueryOrigin::Content => "content query",
    }
}

macro_rules! query_handle_common {
    ($handle:ident) => {
        impl<T: PartialEq + 'static> $handle<T> {
            pub fn id(&self) -> NodeId {
                self.inner.id
            }

            pub fn name(&self) -> &str {
                &self.inner.name
            }

            pub fn origin(&self) -> QueryOrigin {
                self.inner.origin
            }

            /// Whether the host has written results at least once.
            pub fn is_resolved(&self) -> bool {
                self.inner.resolved.get()
            }

            /// Replace the results from the host. Returns `false` if they
            /// were structurally equal to the current ones.
            pub fn set_results(&self, results: Vec<T>) -> bool {
                self.inner.set_results(results)
            }
        }

        impl<T> Clone for $handle<T> {
            fn clone(&self) -> Self {
                Self {
                    inner: Rc::clone(&self.inner),
                }
            }
        }

        impl<T: Debug> Debug for $handle<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($handle))
                    .field("id", &self.inner.id)
                    .field("name", &self.inner.name)
                    .field("origin", &self.inner.origin)
                    .field("results", &self.inner.results.borrow())
                    .finish()
            }
        }
    };
}

/// Query for a single optional child. Reads `None` until resolved.
pub struct ChildQuery<T> {
    inner: Rc<QueryInner<T>>,
}

impl<T: PartialEq + Clone + 'static> ChildQuery<T> {
    /// The first result, if any.
    pub fn get(&self) -> Option<T> {
        self.inner.results().first().cloned()
    }
}

/// Query for a single required child.
pub struct RequiredChildQuery<T> {
    inner: Rc<QueryInner<T>>,
}

impl<T: PartialEq + Clone + 'static> RequiredChildQuery<T> {
    /// The first result.
    ///
    /// Returns [`ReactiveError::ValueNotAvailable`] before resolution and
    /// whenever the resolved result set is empty.
    pub fn get(&self) -> Result<T, ReactiveError> {
        self.inner
            .results()
            .first()
            .cloned()
            .ok_or_else(|| ReactiveError::ValueNotAvailable {
                kind: RequiredKind::ChildQuery,
                name: self.inner.name.clone(),
            })
    }
}

/// Query for every matching child, in order.
pub struct ChildrenQuery<T> {
    inner: Rc<QueryInner<T>>,
}

impl<T: PartialEq + 'static> ChildrenQuery<T> {
    /// The shared result set. Empty until resolved.
    pub fn get(&self) -> Rc<[T]> {
        self.inner.results()
    }
}

query_handle_common!(ChildQuery);
query_handle_common!(RequiredChildQuery);
query_handle_common!(ChildrenQuery);

fn child<T: PartialEq + 'static>(name: impl Into<String>, origin: QueryOrigin) -> ChildQuery<T> {
    Runtime::register_type::<ChildQuery<T>>();
    ChildQuery {
        inner: QueryInner::new(name.into(), origin),
    }
}

fn child_required<T: PartialEq + 'static>(
    name: impl Into<String>,
    origin: QueryOrigin,
) -> RequiredChildQuery<T> {
    Runtime::register_type::<RequiredChildQuery<T>>();
    RequiredChildQuery {
        inner: QueryInner::new(name.into(), origin),
    }
}

fn children<T: PartialEq + 'static>(
    name: impl Into<String>,
    origin: QueryOrigin,
) -> ChildrenQuery<T> {
    Runtime::register_type::<ChildrenQuery<T>>();
    ChildrenQuery {
        inner: QueryInner::new(name.into(), origin),
    }
}

pub fn view_child<T: PartialEq + 'static>(name: impl Into<String>) -> ChildQuery<T> {
    child(name, QueryOrigin::View)
}

pub fn view_child_required<T: PartialEq + 'static>(
    name: impl Into<String>,
) -> RequiredChildQuery<T> {
    child_required(name, QueryOrigin::View)
}

pub fn view_children<T: PartialEq + 'static>(name: impl Into<String>) -> ChildrenQuery<T> {
    children(name, QueryOrigin::View)
}

pub fn content_child<T: PartialEq + 'static>(name: impl Into<String>) -> ChildQuery<T> {
    child(name, QueryOrigin::Content)
}

pub fn content_child_required<T: PartialEq + 'static>(
    name: impl Into<String>,
) -> RequiredChildQuery<T> {
    child_required(name, QueryOrigin::Content)
}

pub fn content_children<T: PartialEq + 'static>(name: impl Into<String>) -> ChildrenQuery<T> {
    children(name, QueryOrigin::Content)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{computed, effect, flush_effects, is_reactive_node};

    #[test]
    fn optional_child_is_none_until_resolved() {
        let el = view_child::<&str>("el");
        assert_eq!(el.get(), None);
        assert!(!el.is_resolved());

        el.set_results(vec!["div"]);
        assert_eq!(el.get(), Some("div"));

        el.set_results(vec![]);
        assert_eq!(el.get(), None);
    }

    #[test]
    fn required_child_errors_until_non_empty() {
        let el = view_child_required::<&str>("el");
        let err = el.get().unwrap_err();
        assert_eq!(
            err,
            ReactiveError::ValueNotAvailable {
                kind: RequiredKind::ChildQuery,
                name: "el".into(),
            }
        );

        el.set_results(vec![]);
        assert!(el.is_resolved());
        assert!(el.get().unwrap_err().is_value_not_available());

        el.set_results(vec!["div"]);
        assert_eq!(el.get().unwrap(), "div");
    }

    #[test]
    fn children_query_keeps_instance_when_unchanged() {
        let els = view_children::<u32>("els");
        assert!(els.get().is_empty());

        assert!(els.set_results(vec![1]));
        let first = els.get();
        assert!(!els.set_results(vec![1]));
        let second = els.get();
        assert!(Rc::ptr_eq(&first, &second));

        assert!(els.set_results(vec![1, 2]));
        assert_eq!(&*els.get(), &[1, 2]);
        assert!(els.set_results(vec![2, 1]));
    }

    #[test]
    fn unchanged_child_does_not_dirty_readers() {
        let el = content_child::<u32>("item");
        el.set_results(vec![7]);

        let recomputes = Rc::new(Cell::new(0));
        let present = computed({
            let (el, recomputes) = (el.clone(), recomputes.clone());
            move || {
                recomputes.set(recomputes.get() + 1);
                el.get().is_some()
            }
        });
        assert!(present.get().unwrap());

        el.set_results(vec![7]);
        assert!(present.get().unwrap());
        assert_eq!(recomputes.get(), 1);
    }

    #[test]
    fn content_children_drive_effects() {
        let items = content_children::<u32>("items");
        let seen = Rc::new(Cell::new(usize::MAX));
        let _e = effect({
            let (items, seen) = (items.clone(), seen.clone());
            move |_| seen.set(items.get().len())
        });
        flush_effects().unwrap();
        assert_eq!(seen.get(), 0);

        items.set_results(vec![1, 2, 3]);
        flush_effects().unwrap();
        assert_eq!(seen.get(), 3);
        assert_eq!(items.origin(), QueryOrigin::Content);
    }

    #[test]
    fn queries_are_reactive_nodes() {
        let one = content_child_required::<u8>("one");
        let many = view_children::<u8>("many");
        assert!(is_reactive_node(&one));
        assert!(is_reactive_node(&many));
    }
}
