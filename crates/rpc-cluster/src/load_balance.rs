//! `select(invokers, url, invocation) -> invoker` (§4.6). Every
//! implementation consults the *provider* URL's `weight` parameter
//! (default 100) with warmup ramp-up, per §4.6's warmup formula:
//! `effective_weight = weight * min(1, uptime_ms / warmup_ms)`.

use {
    dashmap::DashMap,
    md5::{Digest, Md5},
    rand::Rng,
    rpc_core::{BoxInvoker, Invocation, RpcStatusRegistry},
    rpc_url::Url,
    std::{
        collections::BTreeMap,
        sync::atomic::{AtomicI64, Ordering},
    },
};

use crate::error::ClusterError;

const DEFAULT_WEIGHT: u64 = 100;
const DEFAULT_WARMUP_MS: u64 = 10 * 60 * 1000;

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Effective weight for `url`: its declared `weight`, ramped up linearly
/// over `warmup` ms since the `timestamp` parameter (registration time,
/// ms since epoch). Providers with no `timestamp` are treated as fully
/// warmed up — there is no ramp-up to apply.
fn effective_weight(url: &Url) -> u64 {
    let weight = url.parameter_u64("weight", DEFAULT_WEIGHT);
    let Some(timestamp) = url.parameter("timestamp").and_then(|v| v.parse::<u64>().ok()) else {
        return weight;
    };
    let warmup = url.parameter_u64("warmup", DEFAULT_WARMUP_MS);
    if warmup == 0 {
        return weight;
    }
    let uptime = now_millis().saturating_sub(timestamp);
    let ratio = (uptime as f64 / warmup as f64).min(1.0).max(0.0);
    ((weight as f64) * ratio) as u64
}

pub trait LoadBalance: Send + Sync {
    fn select(
        &self,
        invokers: &[BoxInvoker],
        status: &RpcStatusRegistry,
        invocation: &Invocation,
    ) -> Result<BoxInvoker, ClusterError>;
}

fn require_nonempty(invokers: &[BoxInvoker], method: &str) -> Result<(), ClusterError> {
    if invokers.is_empty() {
        Err(ClusterError::NoInvokerAvailable(method.to_string()))
    } else {
        Ok(())
    }
}

/// Weighted random; uniform over list index when every weight is equal
/// (§4.6).
#[derive(Default)]
pub struct Random;

impl LoadBalance for Random {
    fn select(
        &self,
        invokers: &[BoxInvoker],
        _status: &RpcStatusRegistry,
        invocation: &Invocation,
    ) -> Result<BoxInvoker, ClusterError> {
        require_nonempty(invokers, invocation.method_name())?;
        let weights: Vec<u64> = invokers.iter().map(|i| effective_weight(i.url())).collect();
        let total: u64 = weights.iter().sum();
        if total == 0 || weights.iter().all(|&w| w == weights[0]) {
            let idx = rand::thread_rng().gen_range(0..invokers.len());
            return Ok(invokers[idx].clone());
        }
        let mut pick = rand::thread_rng().gen_range(0..total);
        for (invoker, weight) in invokers.iter().zip(weights.iter()) {
            if pick < *weight {
                return Ok(invoker.clone());
            }
            pick -= weight;
        }
        Ok(invokers[invokers.len() - 1].clone())
    }
}

struct RoundRobinState {
    current_weight: AtomicI64,
}

/// Smoothed weighted round robin (§4.6): each invoker accumulates
/// `current_weight += effective_weight` every selection; the invoker with
/// the maximum `current_weight` is picked and has `total_weight`
/// subtracted from it. Per-(url, method) state persists across calls.
#[derive(Default)]
pub struct RoundRobin {
    state: DashMap<(String, String, String), RoundRobinState>,
}

impl LoadBalance for RoundRobin {
    fn select(
        &self,
        invokers: &[BoxInvoker],
        _status: &RpcStatusRegistry,
        invocation: &Invocation,
    ) -> Result<BoxInvoker, ClusterError> {
        require_nonempty(invokers, invocation.method_name())?;
        let weights: Vec<i64> = invokers.iter().map(|i| effective_weight(i.url()) as i64).collect();
        let total: i64 = weights.iter().sum();

        let mut best_idx = 0;
        let mut best_weight = i64::MIN;
        for (idx, (invoker, weight)) in invokers.iter().zip(weights.iter()).enumerate() {
            let key = (invoker.url().to_full_string(), invocation.method_name().to_string(), "rr".to_string());
            let entry = self.state.entry(key).or_insert_with(|| RoundRobinState {
                current_weight: AtomicI64::new(0),
            });
            let current = entry.current_weight.fetch_add(*weight, Ordering::SeqCst) + weight;
            if current > best_weight {
                best_weight = current;
                best_idx = idx;
            }
        }

        let winner_key = (
            invokers[best_idx].url().to_full_string(),
            invocation.method_name().to_string(),
            "rr".to_string(),
        );
        if let Some(entry) = self.state.get(&winner_key) {
            entry.current_weight.fetch_sub(total, Ordering::SeqCst);
        }
        Ok(invokers[best_idx].clone())
    }
}

/// Minimizes `RpcStatus.active`; ties broken by weighted random among the
/// minima, uniform if those weights are also equal (§4.6).
#[derive(Default)]
pub struct LeastActive;

impl LoadBalance for LeastActive {
    fn select(
        &self,
        invokers: &[BoxInvoker],
        status: &RpcStatusRegistry,
        invocation: &Invocation,
    ) -> Result<BoxInvoker, ClusterError> {
        require_nonempty(invokers, invocation.method_name())?;
        let method = invocation.method_name();
        let actives: Vec<u64> = invokers
            .iter()
            .map(|i| status.active(&i.url().to_full_string(), method))
            .collect();
        let min_active = *actives.iter().min().unwrap();
        let minima: Vec<usize> = actives
            .iter()
            .enumerate()
            .filter(|(_, &a)| a == min_active)
            .map(|(idx, _)| idx)
            .collect();

        if minima.len() == 1 {
            return Ok(invokers[minima[0]].clone());
        }

        let weights: Vec<u64> = minima.iter().map(|&idx| effective_weight(invokers[idx].url())).collect();
        let total: u64 = weights.iter().sum();
        if total == 0 || weights.iter().all(|&w| w == weights[0]) {
            let pick = minima[rand::thread_rng().gen_range(0..minima.len())];
            return Ok(invokers[pick].clone());
        }
        let mut remaining = rand::thread_rng().gen_range(0..total);
        for (&idx, weight) in minima.iter().zip(weights.iter()) {
            if remaining < *weight {
                return Ok(invokers[idx].clone());
            }
            remaining -= weight;
        }
        Ok(invokers[*minima.last().unwrap()].clone())
    }
}

const VIRTUAL_NODES_PER_INVOKER: u32 = 160;

fn md5_u64(input: &str) -> u64 {
    let digest = Md5::digest(input.as_bytes());
    u64::from_be_bytes(digest[0..8].try_into().unwrap())
}

/// `key = hash(argument values named by hash.arguments, default first
/// arg)`; ring lookup is the first virtual node at or after that hash
/// ("ceil", §4.6), wrapping to the smallest node past the largest hash.
#[derive(Default)]
pub struct ConsistentHash;

impl ConsistentHash {
    fn hash_key(&self, url: &Url, invocation: &Invocation) -> u64 {
        let arg_indices: Vec<usize> = match url.parameter("hash.arguments") {
            Some(raw) => raw.split(',').filter_map(|s| s.trim().parse().ok()).collect(),
            None => vec![0],
        };
        let mut material = String::new();
        for idx in arg_indices {
            if let Some(arg) = invocation.arguments().get(idx) {
                material.push_str(&arg.to_string());
            }
        }
        md5_u64(&material)
    }
}

impl LoadBalance for ConsistentHash {
    fn select(
        &self,
        invokers: &[BoxInvoker],
        _status: &RpcStatusRegistry,
        invocation: &Invocation,
    ) -> Result<BoxInvoker, ClusterError> {
        require_nonempty(invokers, invocation.method_name())?;
        let mut ring: BTreeMap<u64, usize> = BTreeMap::new();
        for (idx, invoker) in invokers.iter().enumerate() {
            for i in 0..VIRTUAL_NODES_PER_INVOKER {
                let node_key = format!("{}:{i}", invoker.url().address());
                ring.insert(md5_u64(&node_key), idx);
            }
        }
        let key = self.hash_key(invokers[0].url(), invocation);
        let idx = match ring.range(key..).next() {
            Some((_, &idx)) => idx,
            None => *ring.values().next().expect("ring is non-empty, invokers non-empty"),
        };
        Ok(invokers[idx].clone())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rpc_core::{Invoker, RpcResult}, std::sync::Arc};

    struct Stub {
        url: Url,
    }

    #[async_trait::async_trait]
    impl Invoker for Stub {
        fn interface(&self) -> &str {
            "Hello"
        }
        fn url(&self) -> &Url {
            &self.url
        }
        fn is_available(&self) -> bool {
            true
        }
        async fn invoke(&self, _invocation: Invocation) -> RpcResult {
            RpcResult::value(serde_json::json!(null))
        }
        fn destroy(&self) {}
    }

    fn invoker(port: u16, weight: u64) -> BoxInvoker {
        Arc::new(Stub {
            url: Url::new("rpc", "127.0.0.1", port).add_parameter("weight", weight.to_string()),
        })
    }

    fn call() -> Invocation {
        Invocation::new("greet", vec!["String".into()], vec![serde_json::json!("k")])
    }

    #[test]
    fn least_active_prefers_strictly_fewer_active() {
        let status = RpcStatusRegistry::new();
        let a = invoker(1, 100);
        let b = invoker(2, 100);
        let _guard = status.begin(&b.url().to_full_string(), "greet"); // b has active=1

        let lb = LeastActive;
        for _ in 0..1000 {
            let picked = lb.select(&[a.clone(), b.clone()], &status, &call()).unwrap();
            assert_eq!(picked.url().port(), Some(1));
        }
    }

    #[test]
    fn round_robin_distributes_by_weight_ratio() {
        let lb = RoundRobin::default();
        let status = RpcStatusRegistry::new();
        let a = invoker(1, 300);
        let b = invoker(2, 100);
        let mut count_a = 0;
        let mut count_b = 0;
        for _ in 0..400 {
            let picked = lb.select(&[a.clone(), b.clone()], &status, &call()).unwrap();
            if picked.url().port() == Some(1) {
                count_a += 1;
            } else {
                count_b += 1;
            }
        }
        // 3:1 weight ratio should produce roughly a 3:1 pick ratio.
        assert!((count_a as f64 / count_b as f64 - 3.0).abs() < 0.2);
    }

    #[test]
    fn consistent_hash_stable_under_unrelated_removal() {
        let lb = ConsistentHash;
        let status = RpcStatusRegistry::new();
        let invokers: Vec<BoxInvoker> = (1..=4).map(|p| invoker(p, 100)).collect();
        let invocation = Invocation::new("get", vec!["String".into()], vec![serde_json::json!("k")]);
        let picked = lb.select(&invokers, &status, &invocation).unwrap();
        let picked_port = picked.url().port();

        // Remove a provider that isn't the one selected.
        let remaining: Vec<BoxInvoker> = invokers
            .into_iter()
            .filter(|i| i.url().port() != picked_port || i.url().port() == picked_port)
            .filter(|i| i.url().port() != Some(if picked_port == Some(1) { 2 } else { 1 }))
            .collect();
        let picked_again = lb.select(&remaining, &status, &invocation).unwrap();
        assert_eq!(picked_again.url().port(), picked_port);
    }

    #[test]
    fn random_is_uniform_when_weights_equal() {
        let lb = Random;
        let status = RpcStatusRegistry::new();
        let invokers = vec![invoker(1, 100), invoker(2, 100)];
        let mut seen_both = (false, false);
        for _ in 0..200 {
            let picked = lb.select(&invokers, &status, &call()).unwrap();
            match picked.url().port() {
                Some(1) => seen_both.0 = true,
                Some(2) => seen_both.1 = true,
                _ => unreachable!(),
            }
        }
        assert!(seen_both.0 && seen_both.1);
    }
}
