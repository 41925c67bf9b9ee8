use serde::{Deserialize, Serialize};

pub const COMPETENCY_COUNT: usize = 5;

/// A competency differing by more than this between graders needs a third opinion.
pub const COMPETENCY_DIVERGENCE_THRESHOLD: f64 = 80.0;
/// Same, for the total score.
pub const TOTAL_DIVERGENCE_THRESHOLD: f64 = 100.0;

pub type CompetencyScores = [Option<f64>; COMPETENCY_COUNT];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraderScores {
    #[serde(default)]
    pub grader_id: Option<String>,
    #[serde(default)]
    pub scores: CompetencyScores,
    #[serde(default)]
    pub total: Option<f64>,
}

impl GraderScores {
    /// Sum of the five competencies, only when every one was scored.
    pub fn summed_total(&self) -> Option<f64> {
        self.scores.iter().copied().sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingPair {
    #[serde(default)]
    pub first: GraderScores,
    #[serde(default)]
    pub second: GraderScores,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetencyComparison {
    pub competency: usize,
    pub first: f64,
    pub second: f64,
    pub diff: f64,
    pub divergent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DivergenceResult {
    pub divergent: bool,
    pub first_total: f64,
    pub second_total: f64,
    pub total_diff: f64,
    pub competencies: [CompetencyComparison; COMPETENCY_COUNT],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalScores {
    pub competencies: [f64; COMPETENCY_COUNT],
    pub total: f64,
}

impl FinalScores {
    fn from_competencies(competencies: [f64; COMPETENCY_COUNT]) -> Self {
        Self {
            total: competencies.iter().sum(),
            competencies,
        }
    }
}

/// Half rounds up: `2.5 -> 3`, `-2.5 -> -2`.
pub fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

// Unscored competencies count as zero in diffs and averages.
fn score_or_zero(score: Option<f64>) -> f64 {
    score.unwrap_or(0.0)
}

/// `None` until both graders are identified and both totals are recorded.
pub fn resolve_divergence(pair: &GradingPair) -> Option<DivergenceResult> {
    pair.first.grader_id.as_ref()?;
    pair.second.grader_id.as_ref()?;
    let first_total = pair.first.total?;
    let second_total = pair.second.total?;

    let total_diff = (first_total - second_total).abs();
    let competencies: [CompetencyComparison; COMPETENCY_COUNT] = std::array::from_fn(|i| {
        let first = score_or_zero(pair.first.scores[i]);
        let second = score_or_zero(pair.second.scores[i]);
        let diff = (first - second).abs();
        CompetencyComparison {
            competency: i + 1,
            first,
            second,
            diff,
            divergent: diff > COMPETENCY_DIVERGENCE_THRESHOLD,
        }
    });
    let divergent =
        total_diff > TOTAL_DIVERGENCE_THRESHOLD || competencies.iter().any(|c| c.divergent);

    Some(DivergenceResult {
        divergent,
        first_total,
        second_total,
        total_diff,
        competencies,
    })
}

/// Final total is the sum of the rounded competency averages, not the
/// average of the two totals.
pub fn average_final_scores(pair: &GradingPair) -> FinalScores {
    FinalScores::from_competencies(std::array::from_fn(|i| {
        let first = score_or_zero(pair.first.scores[i]);
        let second = score_or_zero(pair.second.scores[i]);
        round_half_up((first + second) / 2.0)
    }))
}

/// The adjudicator's own scores become final; every competency must be scored.
pub fn adjudicated_final_scores(scores: &CompetencyScores) -> Option<FinalScores> {
    let mut competencies = [0.0; COMPETENCY_COUNT];
    for (slot, score) in competencies.iter_mut().zip(scores.iter()) {
        *slot = (*score)?;
    }
    Some(FinalScores::from_competencies(competencies))
}
