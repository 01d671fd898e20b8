mod pillar;
mod thresholds;
mod composer;

pub use pillar::{
    score_associates, score_cargo, score_merchandise, score_route,
    CargoConfig, CounterpartStatus, Factor, MerchandiseConfig, Pillar, PillarEvaluation,
    PillarEvaluator, PillarFailure, PillarScore,
};
pub use thresholds::{Band, RiskLevel, ThresholdTable};
pub use composer::{PillarWeights, RiskComposer, RiskVerdict};
