//! tierscale-capacity: the capacity model of the autoscaling engine.
//!
//! Deciders express their opinion of the minimum capacity a policy's tier
//! needs as an [`AutoscalingCapacity`]: optional storage and memory byte
//! counts, for the tier as a whole and for its largest node. Opinions are
//! lower bounds, so combining them takes the per-dimension maximum.
//!
//! # Aggregation
//!
//! ```text
//! required = NONE
//! for (name, result) in results (sorted by name):
//!     required = required.combine(result.capacity)
//!
//! combine(a, b) per dimension:
//!     (None, None)       -> None
//!     (Some(x), None)    -> Some(x)
//!     (Some(x), Some(y)) -> Some(max(x, y))
//! ```
//!
//! `combine` is associative and commutative with [`AutoscalingCapacity::NONE`]
//! as identity, so deciders may be evaluated in any order.

pub mod capacity;
pub mod error;
pub mod quantity;
pub mod result;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use capacity::{AutoscalingCapacity, AutoscalingResources};
pub use error::{CapacityError, CapacityResult};
pub use quantity::ResourceQuantity;
pub use result::{AutoscalingDeciderResults, DeciderReason, DeciderResult};
