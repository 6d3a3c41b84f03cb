//! Submission-wide summary aggregation
//!
//! Folds per-file results into:
//! - tags grouped by summary type (attribution / behavior / ioc) and tag type
//! - heuristics grouped by verdict tier
//! - the attack matrix grouped by category
//! - the tag map used for cross-highlighting
//!
//! Every group keeps insertion order and deduplicates on the full entry.

pub mod tag_map;
pub mod verdict;

pub use tag_map::TagMap;
pub use verdict::Verdict;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::models::{file_hash, ResultPayload};

/// Summary section a tag type is reported under
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryType {
    Attribution,
    Behavior,
    Ioc,
}

/// Tag types reported under each summary section.
///
/// A section left out of the config keeps its stock list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryTagTypes {
    #[serde(default = "default_attribution")]
    pub attribution: Vec<String>,
    #[serde(default = "default_behavior")]
    pub behavior: Vec<String>,
    #[serde(default = "default_ioc")]
    pub ioc: Vec<String>,
}

fn owned(types: &[&str]) -> Vec<String> {
    types.iter().map(|t| t.to_string()).collect()
}

fn default_attribution() -> Vec<String> {
    owned(&[
        "attribution.actor",
        "attribution.campaign",
        "attribution.exploit",
        "attribution.implant",
        "attribution.family",
        "attribution.network",
        "av.virus_name",
        "file.config",
        "technique.obfuscation",
    ])
}

fn default_behavior() -> Vec<String> {
    owned(&["file.behavior"])
}

fn default_ioc() -> Vec<String> {
    owned(&[
        "network.email.address",
        "network.static.ip",
        "network.static.domain",
        "network.static.uri",
        "network.dynamic.ip",
        "network.dynamic.domain",
        "network.dynamic.uri",
    ])
}

impl Default for SummaryTagTypes {
    fn default() -> Self {
        Self {
            attribution: default_attribution(),
            behavior: default_behavior(),
            ioc: default_ioc(),
        }
    }
}

impl SummaryTagTypes {
    /// Summary section of a tag type, `None` if it is not reported
    pub fn classify(&self, tag_type: &str) -> Option<SummaryType> {
        if self.attribution.iter().any(|t| t == tag_type) {
            Some(SummaryType::Attribution)
        } else if self.behavior.iter().any(|t| t == tag_type) {
            Some(SummaryType::Behavior)
        } else if self.ioc.iter().any(|t| t == tag_type) {
            Some(SummaryType::Ioc)
        } else {
            None
        }
    }
}

/// `(value, verdict)` entry of a tag group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Value>", into = "(String, Verdict)")]
pub struct TagEntry {
    pub value: String,
    pub verdict: Verdict,
}

/// `(heur_id, name)` entry of a heuristic tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Value>", into = "(String, String)")]
pub struct HeuristicEntry {
    pub heur_id: String,
    pub name: String,
}

/// `(attack_id, pattern, verdict)` entry of an attack category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Value>", into = "(String, String, Verdict)")]
pub struct AttackMatrixEntry {
    pub attack_id: String,
    pub pattern: String,
    pub verdict: Verdict,
}

fn string_at(values: &[Value], idx: usize, what: &str) -> Result<String, String> {
    match values.get(idx) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(format!("summary entry is missing {}", what)),
    }
}

fn verdict_at(values: &[Value], idx: usize) -> Result<Verdict, String> {
    let raw = values
        .get(idx)
        .cloned()
        .ok_or_else(|| "summary entry is missing verdict".to_string())?;
    serde_json::from_value(raw).map_err(|e| format!("invalid verdict: {}", e))
}

impl TryFrom<Vec<Value>> for TagEntry {
    type Error = String;

    fn try_from(values: Vec<Value>) -> Result<Self, Self::Error> {
        Ok(Self {
            value: string_at(&values, 0, "value")?,
            verdict: verdict_at(&values, 1)?,
        })
    }
}

impl From<TagEntry> for (String, Verdict) {
    fn from(entry: TagEntry) -> Self {
        (entry.value, entry.verdict)
    }
}

impl TryFrom<Vec<Value>> for HeuristicEntry {
    type Error = String;

    fn try_from(values: Vec<Value>) -> Result<Self, Self::Error> {
        Ok(Self {
            heur_id: string_at(&values, 0, "heuristic id")?,
            name: string_at(&values, 1, "heuristic name")?,
        })
    }
}

impl From<HeuristicEntry> for (String, String) {
    fn from(entry: HeuristicEntry) -> Self {
        (entry.heur_id, entry.name)
    }
}

impl TryFrom<Vec<Value>> for AttackMatrixEntry {
    type Error = String;

    fn try_from(values: Vec<Value>) -> Result<Self, Self::Error> {
        Ok(Self {
            attack_id: string_at(&values, 0, "attack id")?,
            pattern: string_at(&values, 1, "attack pattern")?,
            verdict: verdict_at(&values, 2)?,
        })
    }
}

impl From<AttackMatrixEntry> for (String, String, Verdict) {
    fn from(entry: AttackMatrixEntry) -> Self {
        (entry.attack_id, entry.pattern, entry.verdict)
    }
}

/// Aggregated observations for a whole submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub tags: BTreeMap<SummaryType, BTreeMap<String, Vec<TagEntry>>>,
    #[serde(default)]
    pub heuristics: BTreeMap<Verdict, Vec<HeuristicEntry>>,
    #[serde(default)]
    pub attack_matrix: BTreeMap<String, Vec<AttackMatrixEntry>>,
}

impl Summary {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.heuristics.is_empty() && self.attack_matrix.is_empty()
    }

    fn insert_heuristic(&mut self, verdict: Verdict, entry: HeuristicEntry) -> bool {
        push_unique(self.heuristics.entry(verdict).or_default(), entry)
    }

    fn insert_attack(&mut self, category: &str, entry: AttackMatrixEntry) -> bool {
        push_unique(self.attack_matrix.entry(category.to_string()).or_default(), entry)
    }

    fn insert_tag(&mut self, section: SummaryType, tag_type: &str, entry: TagEntry) -> bool {
        let group = self
            .tags
            .entry(section)
            .or_default()
            .entry(tag_type.to_string())
            .or_default();
        push_unique(group, entry)
    }
}

fn push_unique<T: PartialEq>(list: &mut Vec<T>, entry: T) -> bool {
    if list.contains(&entry) {
        false
    } else {
        list.push(entry);
        true
    }
}

/// Authoritative summary as returned by the summary endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryReport {
    #[serde(flatten)]
    pub summary: Summary,
    #[serde(default)]
    pub map: TagMap,
    #[serde(default)]
    pub heuristic_sections: Value,
    #[serde(default)]
    pub filtered: bool,
    #[serde(default)]
    pub partial: bool,
}

/// Counters describing what a merge added
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub results: usize,
    pub new_entries: usize,
}

/// Incremental fold of live results into a [`Summary`] and [`TagMap`]
#[derive(Debug, Clone, Default)]
pub struct SummaryAggregator {
    tag_types: SummaryTagTypes,
    summary: Summary,
    tag_map: TagMap,
}

impl SummaryAggregator {
    pub fn new(tag_types: SummaryTagTypes) -> Self {
        Self {
            tag_types,
            summary: Summary::default(),
            tag_map: TagMap::new(),
        }
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn tag_map(&self) -> &TagMap {
        &self.tag_map
    }

    /// Drop everything accumulated so far
    pub fn reset(&mut self) {
        self.summary = Summary::default();
        self.tag_map = TagMap::new();
    }

    /// Fold a batch of results into the running summary.
    ///
    /// Keys are processed in sorted order so the insertion order of the
    /// summary is deterministic for a given batch.
    pub fn merge_results(&mut self, results: &HashMap<String, ResultPayload>) -> MergeStats {
        let mut keys: Vec<&String> = results.keys().collect();
        keys.sort();

        let mut stats = MergeStats::default();
        for key in keys {
            stats.results += 1;
            stats.new_entries += self.merge_result(key, &results[key]);
        }
        stats
    }

    fn merge_result(&mut self, key: &str, payload: &ResultPayload) -> usize {
        let file = file_hash(key);
        let mut added = 0;

        for section in &payload.result.sections {
            let verdict = section
                .heuristic
                .as_ref()
                .map(|h| Verdict::from_score(h.score))
                .unwrap_or(Verdict::Info);

            if let Some(heuristic) = &section.heuristic {
                let entry = HeuristicEntry {
                    heur_id: heuristic.heur_id.clone(),
                    name: heuristic.name.clone(),
                };
                if self.summary.insert_heuristic(verdict, entry) {
                    added += 1;
                }
                self.tag_map.link(file, &tag_map::heuristic_key(&heuristic.heur_id));

                for attack in &heuristic.attack {
                    for category in &attack.categories {
                        let entry = AttackMatrixEntry {
                            attack_id: attack.attack_id.clone(),
                            pattern: attack.pattern.clone(),
                            verdict,
                        };
                        if self.summary.insert_attack(category, entry) {
                            added += 1;
                        }
                    }
                    self.tag_map.link(file, &tag_map::attack_key(&attack.attack_id));
                }
            }

            for tag in &section.tags {
                // Unreported tag types still take part in highlighting
                if let Some(section_type) = self.tag_types.classify(&tag.tag_type) {
                    let entry = TagEntry {
                        value: tag.value.clone(),
                        verdict,
                    };
                    if self.summary.insert_tag(section_type, &tag.tag_type, entry) {
                        added += 1;
                    }
                }
                self.tag_map.link(file, &tag_map::tag_key(&tag.tag_type, &tag.value));
            }
        }

        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hash(c: char) -> String {
        c.to_string().repeat(64)
    }

    fn payload(value: Value) -> ResultPayload {
        serde_json::from_value(value).unwrap()
    }

    fn batch(entries: Vec<(String, ResultPayload)>) -> HashMap<String, ResultPayload> {
        entries.into_iter().collect()
    }

    fn sample_result() -> ResultPayload {
        payload(json!({
            "result": {
                "score": 1300,
                "sections": [{
                    "heuristic": {
                        "heur_id": "PE.7",
                        "name": "Packed executable",
                        "score": 300,
                        "attack": [{"attack_id": "T1027", "pattern": "Obfuscated Files", "categories": ["defense-evasion"]}]
                    },
                    "tags": [
                        {"type": "network.static.ip", "value": "10.0.0.1"},
                        {"type": "file.pe.imports.md5", "value": "abcdef"}
                    ]
                }, {
                    "tags": [{"type": "attribution.family", "value": "Emotet"}]
                }]
            },
            "response": {"service_name": "PEFile", "extracted": []}
        }))
    }

    #[test]
    fn test_merge_populates_all_groups() {
        let mut aggregator = SummaryAggregator::new(SummaryTagTypes::default());
        let key = format!("{}.PEFile.v4.c0", hash('a'));
        let stats = aggregator.merge_results(&batch(vec![(key, sample_result())]));

        assert_eq!(stats.results, 1);
        let summary = aggregator.summary();
        assert_eq!(
            summary.heuristics[&Verdict::Suspicious],
            vec![HeuristicEntry { heur_id: "PE.7".into(), name: "Packed executable".into() }]
        );
        assert_eq!(summary.attack_matrix["defense-evasion"][0].attack_id, "T1027");
        assert_eq!(summary.attack_matrix["defense-evasion"][0].verdict, Verdict::Suspicious);
        assert_eq!(
            summary.tags[&SummaryType::Ioc]["network.static.ip"],
            vec![TagEntry { value: "10.0.0.1".into(), verdict: Verdict::Suspicious }]
        );
        // Section without heuristic classifies its tags as info
        assert_eq!(
            summary.tags[&SummaryType::Attribution]["attribution.family"][0].verdict,
            Verdict::Info
        );
    }

    #[test]
    fn test_merge_twice_is_idempotent() {
        let mut aggregator = SummaryAggregator::new(SummaryTagTypes::default());
        let key = format!("{}.PEFile.v4.c0", hash('a'));
        let results = batch(vec![(key, sample_result())]);

        aggregator.merge_results(&results);
        let summary_once = aggregator.summary().clone();
        let map_once = aggregator.tag_map().clone();

        let stats = aggregator.merge_results(&results);
        assert_eq!(stats.new_entries, 0);
        assert_eq!(aggregator.summary(), &summary_once);
        assert_eq!(aggregator.tag_map(), &map_once);
    }

    #[test]
    fn test_unclassified_tags_only_reach_tag_map() {
        let mut aggregator = SummaryAggregator::new(SummaryTagTypes::default());
        let key = format!("{}.PEFile.v4.c0", hash('a'));
        aggregator.merge_results(&batch(vec![(key, sample_result())]));

        let summary = aggregator.summary();
        assert!(summary
            .tags
            .values()
            .all(|group| !group.contains_key("file.pe.imports.md5")));
        assert_eq!(
            aggregator.tag_map().get("file.pe.imports.md5__abcdef"),
            [hash('a')]
        );
    }

    #[test]
    fn test_tag_map_uses_file_hash() {
        let mut aggregator = SummaryAggregator::new(SummaryTagTypes::default());
        let key = format!("{}.PEFile.v4.c0", hash('a'));
        aggregator.merge_results(&batch(vec![(key, sample_result())]));

        let observed = aggregator.tag_map().get(&hash('a'));
        assert!(observed.contains(&"heuristic__PE.7".to_string()));
        assert!(observed.contains(&"attack_pattern__T1027".to_string()));
        assert!(observed.contains(&"network.static.ip__10.0.0.1".to_string()));
        assert_eq!(aggregator.tag_map().get("heuristic__PE.7"), [hash('a')]);
    }

    #[test]
    fn test_same_attack_in_two_categories() {
        let result = payload(json!({
            "result": {"sections": [{
                "heuristic": {
                    "heur_id": "SCRIPT.1", "name": "Shell", "score": 1000,
                    "attack": [{"attack_id": "T1059", "pattern": "Command and Scripting Interpreter", "categories": ["execution"]}]
                }
            }, {
                "heuristic": {
                    "heur_id": "SCRIPT.2", "name": "Hidden shell", "score": 1000,
                    "attack": [{"attack_id": "T1059", "pattern": "Command and Scripting Interpreter", "categories": ["defense-evasion", "execution"]}]
                }
            }]}
        }));
        let mut aggregator = SummaryAggregator::new(SummaryTagTypes::default());
        aggregator.merge_results(&batch(vec![(format!("{}.Script", hash('b')), result)]));

        let matrix = &aggregator.summary().attack_matrix;
        assert_eq!(matrix["execution"].len(), 1);
        assert_eq!(matrix["defense-evasion"].len(), 1);
        assert_eq!(matrix["execution"][0].verdict, Verdict::Malicious);
        assert_eq!(aggregator.tag_map().get("attack_pattern__T1059"), [hash('b')]);
    }

    #[test]
    fn test_same_value_different_tiers_are_distinct() {
        let result = payload(json!({
            "result": {"sections": [
                {"heuristic": {"heur_id": "A", "name": "a", "score": 10}, "tags": [{"type": "network.static.ip", "value": "1.1.1.1"}]},
                {"heuristic": {"heur_id": "B", "name": "b", "score": 2000}, "tags": [{"type": "network.static.ip", "value": "1.1.1.1"}]}
            ]}
        }));
        let mut aggregator = SummaryAggregator::new(SummaryTagTypes::default());
        aggregator.merge_results(&batch(vec![(hash('c'), result)]));

        let entries = &aggregator.summary().tags[&SummaryType::Ioc]["network.static.ip"];
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].verdict, Verdict::Info);
        assert_eq!(entries[1].verdict, Verdict::Malicious);
        assert_eq!(aggregator.tag_map().get("network.static.ip__1.1.1.1").len(), 1);
    }

    #[test]
    fn test_summary_entries_encode_as_arrays() {
        let mut aggregator = SummaryAggregator::new(SummaryTagTypes::default());
        aggregator.merge_results(&batch(vec![(hash('a'), sample_result())]));

        let encoded = serde_json::to_value(aggregator.summary()).unwrap();
        assert_eq!(encoded["heuristics"]["suspicious"][0], json!(["PE.7", "Packed executable"]));
        assert_eq!(encoded["tags"]["ioc"]["network.static.ip"][0], json!(["10.0.0.1", "suspicious"]));
    }

    #[test]
    fn test_authoritative_summary_tolerates_extra_entry_fields() {
        let report: SummaryReport = serde_json::from_value(json!({
            "tags": {"ioc": {"network.static.domain": [["evil.example", "malicious", false, "TLP:CLEAR"]]}},
            "heuristics": {"info": [["AV.1", "Detection"]]},
            "attack_matrix": {"execution": [["T1059", "Interpreter", "malicious"]]},
            "map": {"h1": ["heuristic__AV.1"], "heuristic__AV.1": ["h1"]},
            "heuristic_sections": {},
            "filtered": false,
            "partial": true
        }))
        .unwrap();

        assert!(report.partial);
        assert_eq!(
            report.summary.tags[&SummaryType::Ioc]["network.static.domain"][0],
            TagEntry { value: "evil.example".into(), verdict: Verdict::Malicious }
        );
        assert_eq!(report.map.get("h1"), ["heuristic__AV.1".to_string()]);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut aggregator = SummaryAggregator::new(SummaryTagTypes::default());
        aggregator.merge_results(&batch(vec![(hash('a'), sample_result())]));
        aggregator.reset();
        assert!(aggregator.summary().is_empty());
        assert!(aggregator.tag_map().is_empty());
    }

    #[test]
    fn test_classify_custom_lists() {
        let types = SummaryTagTypes {
            attribution: vec![],
            behavior: vec!["dynamic.process.command_line".into()],
            ioc: vec![],
        };
        assert_eq!(types.classify("dynamic.process.command_line"), Some(SummaryType::Behavior));
        assert_eq!(types.classify("network.static.ip"), None);
    }
}
