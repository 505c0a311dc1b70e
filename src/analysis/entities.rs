//! Heuristic entity extraction
//!
//! Clusters proper-noun-like spans into entity nodes:
//! - multi-word names anchor a cluster ("Mara Quell", "Captain Reyes")
//! - single tokens that match a non-title token of an anchor become aliases
//! - sentence-initial capitals count only if the word is also capitalized
//!   mid-sentence, or recurs and never appears in lowercase
//!
//! Classification is by suffix/keyword dictionaries and by how often a
//! name follows a locative preposition. Approximate by design.

use super::utils::{text, CommonPatterns, EntityDictionaries};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Character,
    Location,
    Object,
}

impl EntityType {
    pub fn label(&self) -> &'static str {
        match self {
            EntityType::Character => "character",
            EntityType::Location => "location",
            EntityType::Object => "object",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMention {
    pub offset: usize,
    pub chapter_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityNode {
    pub id: String,
    pub name: String,
    pub entity_type: EntityType,
    pub aliases: Vec<String>,
    pub first_mention: usize,
    pub mention_count: usize,
    pub mentions: Vec<EntityMention>,
    pub attributes: BTreeMap<String, String>,
}

/// Undirected co-occurrence edge; `source < target` by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityEdge {
    pub source: String,
    pub target: String,
    /// Paragraphs in which both appear
    pub weight: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityGraph {
    pub nodes: Vec<EntityNode>,
    pub edges: Vec<EntityEdge>,
}

impl EntityGraph {
    pub fn node(&self, id: &str) -> Option<&EntityNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Find by canonical name or alias, case-insensitively
    pub fn find_by_name(&self, name: &str) -> Option<&EntityNode> {
        self.nodes.iter().find(|n| {
            n.name.eq_ignore_ascii_case(name) || n.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
        })
    }
}

#[derive(Debug)]
struct Candidate {
    name: String,
    offset: usize,
    sentence_start: bool,
}

#[derive(Debug)]
struct Cluster {
    name: String,
    tokens: Vec<String>,
    aliases: BTreeSet<String>,
    mentions: Vec<usize>,
}

/// Extract the entity graph of one chapter
pub fn extract_entities(text: &str, chapter_id: &str) -> EntityGraph {
    let candidates = collect_candidates(text);
    if candidates.is_empty() {
        return EntityGraph::default();
    }

    let accepted = accepted_names(text, &candidates);
    let (mut clusters, name_to_cluster) = cluster_names(&candidates, &accepted);

    for c in candidates.iter().filter(|c| accepted.contains(&c.name)) {
        if let Some(&idx) = name_to_cluster.get(&c.name) {
            clusters[idx].mentions.push(c.offset);
        }
    }
    clusters.retain(|c| !c.mentions.is_empty());

    let mut nodes: Vec<EntityNode> = clusters
        .iter()
        .map(|cluster| build_node(text, chapter_id, cluster))
        .collect();
    nodes.sort_by_key(|n| n.first_mention);

    attach_appositives(text, &mut nodes);
    let edges = co_occurrence_edges(text, &nodes);

    EntityGraph { nodes, edges }
}

fn collect_candidates(text: &str) -> Vec<Candidate> {
    let non_names = EntityDictionaries::non_names();
    let titles = EntityDictionaries::titles();
    let mut out = Vec::new();

    for m in CommonPatterns::name_run().find_iter(text) {
        let tokens: Vec<(usize, &str)> = text::words(m.as_str())
            .map(|(pos, w)| (m.start() + pos, w))
            .collect();

        let mut lo = 0;
        while lo < tokens.len() && non_names.contains(tokens[lo].1) && !titles.contains(tokens[lo].1) {
            lo += 1;
        }
        let mut hi = tokens.len();
        while hi > lo && matches!(tokens[hi - 1].1, "of" | "the") {
            hi -= 1;
        }
        if lo >= hi {
            continue;
        }

        let kept = &tokens[lo..hi];
        let mut parts: Vec<String> = kept.iter().map(|(_, w)| w.to_string()).collect();
        if let Some(last) = parts.last_mut() {
            for suffix in ["’s", "'s"] {
                if let Some(stripped) = last.strip_suffix(suffix).map(str::to_string) {
                    *last = stripped;
                }
            }
        }

        if parts.len() == 1 && (titles.contains(parts[0].as_str()) || non_names.contains(parts[0].as_str())) {
            continue;
        }
        if parts.iter().all(|p| p.chars().count() < 2) {
            continue;
        }

        let offset = kept[0].0;
        out.push(Candidate {
            name: parts.join(" "),
            offset,
            sentence_start: is_sentence_start(text, offset),
        });
    }

    out
}

fn is_sentence_start(text: &str, offset: usize) -> bool {
    for c in text[..offset].chars().rev() {
        match c {
            '\n' => return true,
            '.' | '!' | '?' | '…' | ':' => return true,
            '"' | '“' | '\'' | '‘' | '(' | '—' => continue,
            c if c.is_whitespace() => continue,
            _ => return false,
        }
    }
    true
}

fn accepted_names(text: &str, candidates: &[Candidate]) -> HashSet<String> {
    let lowercase_words: HashSet<&str> = text::words(text)
        .map(|(_, w)| w)
        .filter(|w| w.chars().next().is_some_and(char::is_lowercase))
        .collect();

    let mut mid_sentence: HashSet<&str> = HashSet::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for c in candidates {
        *counts.entry(c.name.as_str()).or_default() += 1;
        if !c.sentence_start {
            mid_sentence.insert(c.name.as_str());
        }
    }

    counts
        .into_iter()
        .filter(|(name, count)| {
            let multi_word = name.contains(' ');
            multi_word
                || mid_sentence.contains(*name)
                || (*count >= 2 && !lowercase_words.contains(name.to_lowercase().as_str()))
        })
        .map(|(name, _)| name.to_string())
        .collect()
}

fn significant_tokens(name: &str) -> Vec<String> {
    name.split_whitespace()
        .filter(|t| {
            !matches!(*t, "of" | "the") && !EntityDictionaries::titles().contains(*t)
        })
        .map(str::to_string)
        .collect()
}

fn cluster_names(
    candidates: &[Candidate],
    accepted: &HashSet<String>,
) -> (Vec<Cluster>, HashMap<String, usize>) {
    // distinct accepted names with their first offset
    let mut first_seen: Vec<(&str, usize)> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for c in candidates {
        if accepted.contains(&c.name) && seen.insert(c.name.as_str()) {
            first_seen.push((c.name.as_str(), c.offset));
        }
    }
    // anchors (more tokens) first, then by appearance
    first_seen.sort_by(|a, b| {
        let ta = a.0.split_whitespace().count();
        let tb = b.0.split_whitespace().count();
        tb.cmp(&ta).then(a.1.cmp(&b.1))
    });

    let mut clusters: Vec<Cluster> = Vec::new();
    let mut name_to_cluster: HashMap<String, usize> = HashMap::new();

    for (name, _) in first_seen {
        let is_single = !name.contains(' ');
        let existing = if is_single {
            clusters
                .iter()
                .position(|cl| cl.tokens.iter().any(|t| t == name))
        } else {
            None
        };

        match existing {
            Some(idx) => {
                clusters[idx].aliases.insert(name.to_string());
                name_to_cluster.insert(name.to_string(), idx);
            }
            None => {
                clusters.push(Cluster {
                    name: name.to_string(),
                    tokens: significant_tokens(name),
                    aliases: BTreeSet::new(),
                    mentions: Vec::new(),
                });
                name_to_cluster.insert(name.to_string(), clusters.len() - 1);
            }
        }
    }

    (clusters, name_to_cluster)
}

fn slug(name: &str) -> String {
    name.split_whitespace()
        .map(|t| {
            t.chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn preceded_by_location_preposition(text: &str, offset: usize) -> bool {
    let before: Vec<&str> = text[..offset]
        .rsplit(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .take(2)
        .collect();
    let preps = EntityDictionaries::location_prepositions();
    match before.as_slice() {
        [w, ..] if preps.contains(w.to_lowercase().as_str()) => true,
        ["the", w, ..] | ["The", w, ..] => preps.contains(w.to_lowercase().as_str()),
        _ => false,
    }
}

fn classify(text: &str, cluster: &Cluster) -> EntityType {
    let tokens: Vec<&str> = cluster.name.split_whitespace().collect();
    if tokens
        .last()
        .is_some_and(|t| EntityDictionaries::location_suffixes().contains(*t))
    {
        return EntityType::Location;
    }
    if tokens
        .iter()
        .any(|t| EntityDictionaries::object_keywords().contains(*t))
    {
        return EntityType::Object;
    }
    if EntityDictionaries::titles().contains(tokens[0]) {
        return EntityType::Character;
    }

    let locative = cluster
        .mentions
        .iter()
        .filter(|&&offset| preceded_by_location_preposition(text, offset))
        .count();
    if locative * 2 > cluster.mentions.len() {
        EntityType::Location
    } else {
        EntityType::Character
    }
}

fn build_node(text: &str, chapter_id: &str, cluster: &Cluster) -> EntityNode {
    let mut offsets = cluster.mentions.clone();
    offsets.sort_unstable();
    offsets.dedup();

    let mut attributes = BTreeMap::new();
    if let Some(first) = cluster.name.split_whitespace().next() {
        if EntityDictionaries::titles().contains(first) {
            attributes.insert("title".to_string(), first.to_string());
        }
    }

    EntityNode {
        id: format!("entity-{}", slug(&cluster.name)),
        name: cluster.name.clone(),
        entity_type: classify(text, cluster),
        aliases: cluster.aliases.iter().cloned().collect(),
        first_mention: offsets.first().copied().unwrap_or(0),
        mention_count: offsets.len(),
        mentions: offsets
            .into_iter()
            .map(|offset| EntityMention {
                offset,
                chapter_id: chapter_id.to_string(),
            })
            .collect(),
        attributes,
    }
}

fn attach_appositives(text: &str, nodes: &mut [EntityNode]) {
    for caps in CommonPatterns::appositive().captures_iter(text) {
        let (Some(name), Some(desc)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        if let Some(node) = nodes.iter_mut().find(|n| {
            n.name == name.as_str() || n.aliases.iter().any(|a| a == name.as_str())
        }) {
            node.attributes
                .entry("description".to_string())
                .or_insert_with(|| desc.as_str().to_string());
        }
    }
}

fn co_occurrence_edges(text: &str, nodes: &[EntityNode]) -> Vec<EntityEdge> {
    let mut weights: BTreeMap<(String, String), usize> = BTreeMap::new();

    for para in text::lines(text) {
        let mut present: Vec<&str> = nodes
            .iter()
            .filter(|n| n.mentions.iter().any(|m| para.contains(&m.offset)))
            .map(|n| n.id.as_str())
            .collect();
        present.sort_unstable();
        present.dedup();

        for i in 0..present.len() {
            for j in i + 1..present.len() {
                *weights
                    .entry((present[i].to_string(), present[j].to_string()))
                    .or_default() += 1;
            }
        }
    }

    weights
        .into_iter()
        .map(|((source, target), weight)| EntityEdge {
            source,
            target,
            weight,
        })
        .collect()
}
