//! Binding Adapters
//!
//! Read-only signal variants whose values are written by a host framework
//! rather than by the component that reads them:
//!
//! - [`InputSignal`]: a component input, optional or required, with an
//!   optional transform applied once per incoming value.
//! - [`ChildQuery`], [`RequiredChildQuery`] and [`ChildrenQuery`]: results of
//!   view and content queries.
//!
//! Both participate in the dependency graph as ordinary producers.

mod input;
mod query;

pub use input::{input, input_required, input_required_transformed, input_transformed, InputSignal};
pub use query::{
    content_child, content_child_required, content_children, view_child, view_child_required,
    view_children, ChildQuery, ChildrenQuery, QueryOrigin, RequiredChildQuery,
};
