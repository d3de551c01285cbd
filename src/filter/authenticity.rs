// src/filter/authenticity.rs
//! Community-signal authenticity score in [0, 1].

use crate::deal::Deal;

pub const DEFAULT_QUESTIONABLE_THRESHOLD: f64 = 0.4;

const VOTE_WEIGHT: f64 = 0.7;
const COMMENT_WEIGHT: f64 = 0.3;
const NEUTRAL: f64 = 0.5;

#[derive(Debug, Clone, Copy)]
pub struct AuthenticityAssessor {
    pub min_votes_threshold: i64,
    pub min_comments_threshold: u32,
}

impl Default for AuthenticityAssessor {
    fn default() -> Self {
        Self {
            min_votes_threshold: 5,
            min_comments_threshold: 2,
        }
    }
}

impl AuthenticityAssessor {
    /// 70/30 vote/comment blend; whichever signal is missing drops out, and
    /// with neither the score is neutral 0.5.
    pub fn assess(&self, deal: &Deal) -> f64 {
        let score = match (deal.votes, deal.comments) {
            (Some(v), Some(c)) => {
                self.vote_score(v) * VOTE_WEIGHT + self.comment_score(c) * COMMENT_WEIGHT
            }
            (Some(v), None) => self.vote_score(v),
            (None, Some(c)) => self.comment_score(c),
            (None, None) => NEUTRAL,
        };
        score.clamp(0.0, 1.0)
    }

    pub fn vote_score(&self, votes: i64) -> f64 {
        if votes < 0 {
            (NEUTRAL + votes as f64 * 0.1).max(0.0)
        } else if votes == 0 {
            NEUTRAL
        } else if votes < self.min_votes_threshold {
            0.6 + votes as f64 * 0.05
        } else {
            let capped = votes.min(50) as f64;
            (0.6 + (capped + 1.0).ln() * 0.1).min(1.0)
        }
    }

    pub fn comment_score(&self, comments: u32) -> f64 {
        if comments == 0 {
            0.48
        } else if comments < self.min_comments_threshold {
            0.52 + f64::from(comments) * 0.02
        } else {
            let capped = f64::from(comments.min(20));
            (0.55 + (capped + 1.0).ln() * 0.08).min(1.0)
        }
    }

    pub fn is_questionable(&self, score: f64, threshold: f64) -> bool {
        score < threshold
    }

    pub fn describe(&self, score: f64) -> &'static str {
        if score >= 0.8 {
            "Highly trusted by community"
        } else if score >= 0.6 {
            "Well-regarded by community"
        } else if score >= 0.4 {
            "Mixed community signals"
        } else if score >= 0.2 {
            "Questionable community reception"
        } else {
            "Potentially problematic deal"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deal::tests::sample_deal;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn vote_bands() {
        let a = AuthenticityAssessor::default();
        assert!(close(a.vote_score(-3), 0.2));
        assert!(close(a.vote_score(-10), 0.0));
        assert!(close(a.vote_score(0), 0.5));
        assert!(close(a.vote_score(4), 0.8));
        assert!(close(a.vote_score(5), 0.6 + 6f64.ln() * 0.1));
        assert!(close(a.vote_score(500), a.vote_score(50)));
    }

    #[test]
    fn comment_bands() {
        let a = AuthenticityAssessor::default();
        assert!(close(a.comment_score(0), 0.48));
        assert!(close(a.comment_score(1), 0.54));
        assert!(close(a.comment_score(2), 0.55 + 3f64.ln() * 0.08));
        assert!(close(a.comment_score(99), a.comment_score(20)));
    }

    #[test]
    fn blend_and_missing_signals() {
        let a = AuthenticityAssessor::default();
        let mut d = sample_deal();
        d.votes = Some(0);
        d.comments = Some(0);
        assert!(close(a.assess(&d), 0.5 * 0.7 + 0.48 * 0.3));

        d.votes = None;
        d.comments = None;
        assert!(close(a.assess(&d), 0.5));

        d.votes = Some(4);
        assert!(close(a.assess(&d), 0.8));
    }

    #[test]
    fn questionable_and_descriptions() {
        let a = AuthenticityAssessor::default();
        assert!(a.is_questionable(0.39, DEFAULT_QUESTIONABLE_THRESHOLD));
        assert!(!a.is_questionable(0.4, DEFAULT_QUESTIONABLE_THRESHOLD));
        assert_eq!(a.describe(0.85), "Highly trusted by community");
        assert_eq!(a.describe(0.1), "Potentially problematic deal");
    }
}
