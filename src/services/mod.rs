pub mod bkt;
pub mod eligibility;
pub mod evidence;
pub mod improvement;
pub mod mastery_engine;
pub mod recommendation;
