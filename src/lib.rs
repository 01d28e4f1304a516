pub mod core;
pub mod topology;
pub mod predicate;
pub mod memo;
pub mod candidates;
pub mod constraint;
pub mod ranker;
pub mod solver;
pub mod anagram;
pub mod puzzle;
pub mod session;
pub mod debug;
pub mod bench;
pub mod tui;
pub mod tui_util;
