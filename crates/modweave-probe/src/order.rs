use crate::session::AnalysisSession;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// A file whose position in the safe order differs from the raw order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAnomaly {
    pub file: String,
    pub raw_index: usize,
    pub safe_index: usize,
}

/// Reorder `raw` so every file runs after the first definer of each global it
/// read, whether the read found nothing (missing) or found another file's
/// value (use). Ties keep raw order; files caught in a definition cycle are
/// appended in raw order.
pub fn safe_order(raw: &[String], session: &AnalysisSession) -> Vec<String> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    for (i, file) in raw.iter().enumerate() {
        index.entry(file.as_str()).or_insert(i);
    }

    let mut edges: BTreeSet<(usize, usize)> = BTreeSet::new();
    for (consumer, file) in raw.iter().enumerate() {
        let missing = session
            .missing_by_file
            .get(file)
            .into_iter()
            .flat_map(|symbols| symbols.keys());
        let used = session.uses.get(file).into_iter().flatten();
        for symbol in missing.chain(used) {
            let provider = session
                .first_definer(symbol)
                .and_then(|definer| index.get(definer))
                .copied();
            match provider {
                Some(provider) if provider != consumer => {
                    edges.insert((provider, consumer));
                }
                _ => {}
            }
        }
    }

    let n = raw.len();
    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(provider, consumer) in &edges {
        dependents[provider].push(consumer);
        in_degree[consumer] += 1;
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut placed = vec![false; n];
    let mut order = Vec::with_capacity(n);
    while let Some(next) = ready.pop_first() {
        placed[next] = true;
        order.push(raw[next].clone());
        for &consumer in &dependents[next] {
            in_degree[consumer] -= 1;
            if in_degree[consumer] == 0 {
                ready.insert(consumer);
            }
        }
    }
    order.extend(
        raw.iter()
            .enumerate()
            .filter(|(i, _)| !placed[*i])
            .map(|(_, file)| file.clone()),
    );
    order
}

pub fn order_anomalies(raw: &[String], safe: &[String]) -> Vec<OrderAnomaly> {
    let safe_index: HashMap<&str, usize> = safe
        .iter()
        .enumerate()
        .map(|(i, file)| (file.as_str(), i))
        .collect();
    raw.iter()
        .enumerate()
        .filter_map(|(raw_index, file)| {
            let safe_index = *safe_index.get(file.as_str())?;
            (safe_index != raw_index).then(|| OrderAnomaly {
                file: file.clone(),
                raw_index,
                safe_index,
            })
        })
        .collect()
}
