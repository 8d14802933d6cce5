//! Layout module: Rectangles and the layout collaborator.
//!
//! [`Rect`] and [`Bounds`] are the geometry every other module speaks.
//! [`LayoutProvider`] turns the scene graph into a [`LayoutMap`] once per
//! frame; [`AbsoluteLayout`] is the built-in provider.

mod provider;
mod rect;

pub use provider::{AbsoluteLayout, LayoutMap, LayoutProvider};
pub use rect::{Bounds, Rect};
