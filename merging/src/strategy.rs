use ndarray::Array2;

use crate::{
    HubConfig, HubMerger, LoraAdapter, MergedDelta, Result, SoupsConfig, SoupsMerger, ZipConfig,
    ZipMerger,
};

/// A merge strategy paired with its configuration.
///
/// Callers that select a strategy at runtime dispatch through
/// [`MergeStrategy::merge`] instead of naming a concrete merger.
#[derive(Debug, Clone)]
pub enum MergeStrategy {
    Soups(SoupsConfig),
    Zip(ZipConfig),
    Hub(HubConfig),
}

impl MergeStrategy {
    /// Merges the adapter library under the selected strategy.
    ///
    /// `objective` is the few-shot objective LoRAHub searches against;
    /// the other strategies ignore it.
    ///
    /// # Errors
    /// Propagates the selected merger's `MergeError`.
    pub fn merge<F>(&self, adapters: &[LoraAdapter], objective: F) -> Result<MergedDelta>
    where
        F: Fn(&Array2<f32>) -> f32 + Sync,
    {
        match self {
            Self::Soups(config) => SoupsMerger::new(config.clone()).merge(adapters),
            Self::Zip(config) => ZipMerger::new(config.clone()).merge(adapters),
            Self::Hub(config) => HubMerger::new(config.clone()).merge(adapters, objective),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn adapter(task: &str, value: f32) -> LoraAdapter {
        let down = array![[value, value]];
        let up = array![[1.0], [1.0]];
        LoraAdapter::new(task, down, up, 1.0).unwrap()
    }

    fn library() -> Vec<LoraAdapter> {
        vec![adapter("a", 1.0), adapter("b", -0.5)]
    }

    #[test]
    fn dispatch_matches_direct_mergers() {
        let adapters = library();
        let objective = |delta: &Array2<f32>| delta.iter().map(|x| x * x).sum::<f32>();

        let soups = MergeStrategy::Soups(SoupsConfig::default())
            .merge(&adapters, objective)
            .unwrap();
        let direct = SoupsMerger::new(SoupsConfig::default())
            .merge(&adapters)
            .unwrap();
        assert_eq!(soups.delta, direct.delta);

        let zip = MergeStrategy::Zip(ZipConfig::default())
            .merge(&adapters, objective)
            .unwrap();
        let direct = ZipMerger::new(ZipConfig::default()).merge(&adapters).unwrap();
        assert_eq!(zip.delta, direct.delta);

        let hub = MergeStrategy::Hub(HubConfig::default())
            .merge(&adapters, objective)
            .unwrap();
        let direct = HubMerger::new(HubConfig::default())
            .merge(&adapters, objective)
            .unwrap();
        assert_eq!(hub.delta, direct.delta);
    }

    #[test]
    fn empty_library_is_an_error() {
        let objective = |_: &Array2<f32>| 0.0;
        assert!(MergeStrategy::Soups(SoupsConfig::default())
            .merge(&[], objective)
            .is_err());
    }
}
