//! Point awards for clicks and ad views, and the variable-reward odds.

pub mod click;
pub mod odds;
pub mod risk;

pub use click::{ClickConfig, ClickInput, ClickReward, ClickRewardCalculator};
pub use odds::{CriticalChances, Odds, OddsTable};
pub use risk::{RiskPenalty, RiskPenaltyError};

use crate::progression::Level;

/// Points for one rewarded-ad view: `floor(level.ad_reward * risk)`
#[must_use]
pub fn ad_reward(level: &Level, risk: RiskPenalty) -> u64 {
    risk.apply(level.ad_reward)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progression::LevelCalculator;

    #[test]
    fn test_ad_reward_scales_with_level_and_risk() {
        let seedling = LevelCalculator::for_points(0);
        let hero = LevelCalculator::for_points(50_000);
        assert_eq!(ad_reward(&seedling, RiskPenalty::NONE), 5);
        assert_eq!(ad_reward(&hero, RiskPenalty::NONE), 20);
        assert_eq!(ad_reward(&seedling, RiskPenalty::new(0.5).unwrap()), 2);
    }
}
