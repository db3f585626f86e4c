/// Themed phrase pools and filler-scene text composition.
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::core::rng::StoryRng;

/// Named pools of atmospheric lines ("room", "object", "antagonist", ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MotifPools {
    pub pools: FxHashMap<String, Vec<String>>,
}

impl MotifPools {
    pub fn new(pools: FxHashMap<String, Vec<String>>) -> Self {
        Self { pools }
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    pub fn pool(&self, name: &str) -> Option<&[String]> {
        self.pools.get(name).map(Vec::as_slice)
    }

    /// Pick one line from the named pool.
    pub fn pick(&self, name: &str, rng: &mut StoryRng) -> Option<String> {
        self.pool(name).and_then(|lines| rng.pick(lines)).cloned()
    }
}

/// An exit offered by every synthesized filler scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillerExit {
    pub label: String,
    pub to: String,
}

/// How filler scenes are assembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "Filler")]
pub struct FillerSpec {
    /// Pools drawn from, in sentence order.
    #[serde(default = "default_motif_order")]
    pub motif_order: Vec<String>,
    #[serde(default = "default_closing")]
    pub closing: String,
    /// Empty means: route to the best-connected authored scenes.
    #[serde(default)]
    pub exits: Vec<FillerExit>,
}

fn default_motif_order() -> Vec<String> {
    vec!["room".to_string(), "object".to_string(), "knock".to_string()]
}

fn default_closing() -> String {
    "You feel the story tightening around you.".to_string()
}

impl Default for FillerSpec {
    fn default() -> Self {
        Self {
            motif_order: default_motif_order(),
            closing: default_closing(),
            exits: Vec::new(),
        }
    }
}

impl FillerSpec {
    /// Compose filler text: one line per motif pool, then the closing line.
    /// Pools that are missing or empty are skipped.
    pub fn compose(&self, motifs: &MotifPools, rng: &mut StoryRng) -> String {
        let mut text = String::new();
        for name in &self.motif_order {
            if let Some(line) = motifs.pick(name, rng) {
                text.push_str(line.trim_end_matches('.'));
                text.push_str(". ");
            }
        }
        text.push_str(&self.closing);
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pools() -> MotifPools {
        let mut pools = FxHashMap::default();
        pools.insert(
            "room".to_string(),
            vec![
                "A cold wind rattles the panes".to_string(),
                "The lamp flickers like a dying heartbeat".to_string(),
            ],
        );
        pools.insert(
            "object".to_string(),
            vec!["The withered paw lies heavy with unspoken promises".to_string()],
        );
        pools.insert(
            "knock".to_string(),
            vec!["Three knocks, then silence, then three more".to_string()],
        );
        MotifPools::new(pools)
    }

    #[test]
    fn compose_uses_every_pool_in_order() {
        let spec = FillerSpec::default();
        let mut rng = StoryRng::new(3);
        let text = spec.compose(&pools(), &mut rng);
        let object = text.find("withered paw").unwrap();
        let knock = text.find("Three knocks").unwrap();
        assert!(object < knock);
        assert!(text.ends_with("You feel the story tightening around you."));
    }

    #[test]
    fn missing_pools_are_skipped() {
        let spec = FillerSpec {
            motif_order: vec!["nothing_here".to_string(), "object".to_string()],
            ..FillerSpec::default()
        };
        let mut rng = StoryRng::new(3);
        let text = spec.compose(&pools(), &mut rng);
        assert!(text.starts_with("The withered paw"));
    }

    #[test]
    fn compose_is_deterministic_per_seed() {
        let spec = FillerSpec::default();
        let a = spec.compose(&pools(), &mut StoryRng::new(11));
        let b = spec.compose(&pools(), &mut StoryRng::new(11));
        assert_eq!(a, b);
    }

    #[test]
    fn pick_from_unknown_pool() {
        let mut rng = StoryRng::new(1);
        assert_eq!(pools().pool_count(), 3);
        assert!(pools().pick("absent", &mut rng).is_none());
        assert!(pools().pick("room", &mut rng).is_some());
    }
}
