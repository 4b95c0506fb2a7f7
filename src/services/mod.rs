pub mod cooldown;
pub mod progress;
pub mod question_selector;
pub mod retention;
pub mod scoring;
pub mod skill;
