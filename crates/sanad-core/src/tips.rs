//! Self-help tips

use rand::seq::SliceRandom;
use rand::Rng;

pub const TIPS: [&str; 10] = [
    "Define the problem clearly and write down its details: what it is, when it shows up, and how it affects you.",
    "Break the problem into small, manageable pieces so it does not overwhelm you.",
    "Make a plan with specific goals and a timeline for each step.",
    "Ask a trusted friend or family member to talk the problem through and look for new solutions with you.",
    "Keep a journal of your thoughts and feelings to let go of worry and notice recurring patterns.",
    "Step away from focused thinking for a while (a hobby, a walk) and come back to the problem with a clear head.",
    "Focus on the next possible solutions instead of dwelling on the problem itself.",
    "Adopt a growth mindset: treat mistakes as chances to learn and improve.",
    "Try activities that spark creative thinking, such as puzzles, drawing or free writing.",
    "When stress or anxiety gets intense, do not hesitate to consult a mental health professional or a certified coach.",
];

/// One tip, chosen at random
pub fn random_tip() -> &'static str {
    random_tip_with(&mut rand::thread_rng())
}

pub fn random_tip_with<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    TIPS.choose(rng).copied().unwrap_or(TIPS[0])
}
