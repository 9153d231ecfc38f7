//! Request validation
//!
//! Every validated endpoint goes through the same pipeline:
//!
//! 1. **Defaults** - endpoint defaults fill in fields the client left out
//! 2. **Sanitizers** - every string is stripped, escaped and cleaned, unless
//!    the endpoint forwards its values untouched (the Edamam proxies)
//! 3. **Validators** - the endpoint's declarative [`rules`] are evaluated
//! 4. **Hooks** - cross-request checks run after the field rules
//!
//! Handlers take a [`Validated<E>`](extractors::Validated) argument and only
//! run when all of the above passed.
//!
//! # Validation Error Response
//!
//! Rejected requests answer 422 Unprocessable Entity:
//!
//! ```json
//! {
//!   "message": "The given data was invalid.",
//!   "errors": {
//!     "email": ["The email address field is required."],
//!     "password": ["The password field confirmation does not match."]
//!   }
//! }
//! ```

pub mod extractors;
pub mod hooks;
pub mod messages;
pub mod pipeline;
pub mod requests;
pub mod rules;
pub mod sanitizers;
pub mod uploads;
pub mod validators;

pub use extractors::Validated;
pub use hooks::{Flow, PostValidator};
pub use pipeline::{Collaborators, ValidationPipeline};
pub use requests::EndpointKind;
pub use rules::{EndpointSpec, FieldSpec, PasswordPolicy, Rule};
