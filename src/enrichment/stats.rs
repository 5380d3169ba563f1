//! 富集检验用到的统计量：超几何上尾概率、Benjamini-Hochberg 校正与 Jaccard 指数

use anyhow::{Context, Result};
use statrs::distribution::{DiscreteCDF, Hypergeometric};
use std::collections::BTreeSet;

/// 超几何上尾概率 P(X >= observed)
///
/// * `population` - 背景基因数（层级中所有社区成员的并集）
/// * `successes` - 术语中落在背景内的基因数
/// * `draws` - 社区大小
/// * `observed` - 社区与术语的重叠基因数
pub fn hypergeometric_sf(population: u64, successes: u64, draws: u64, observed: u64) -> Result<f64> {
    if observed == 0 {
        return Ok(1.0);
    }
    let hyper = Hypergeometric::new(population, successes, draws).with_context(|| {
        format!(
            "Invalid hypergeometric parameters: population={}, successes={}, draws={}",
            population, successes, draws
        )
    })?;
    // sf(x) 为 P(X > x)，减一后包含 observed 本身
    Ok(hyper.sf(observed - 1).clamp(0.0, 1.0))
}

/// Benjamini-Hochberg 校正，返回与输入顺序一致的 q 值
///
/// q[i] = min(p[i] * n / rank[i], q[i+1])，并截断到 1
pub fn benjamini_hochberg(p_values: &[f64]) -> Vec<f64> {
    let n = p_values.len();
    if n == 0 {
        return vec![];
    }

    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&a, &b| {
        p_values[a]
            .partial_cmp(&p_values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut q_sorted = vec![0.0; n];
    let n_f64 = n as f64;

    // 从最大的 p 值开始向前累积最小值
    q_sorted[n - 1] = p_values[indices[n - 1]].min(1.0);
    for i in (0..n - 1).rev() {
        let rank = i + 1;
        let adjusted = p_values[indices[i]] * n_f64 / rank as f64;
        q_sorted[i] = adjusted.min(q_sorted[i + 1]).min(1.0);
    }

    let mut q_values = vec![0.0; n];
    for (i, &orig_idx) in indices.iter().enumerate() {
        q_values[orig_idx] = q_sorted[i];
    }
    q_values
}

/// 两个集合的 Jaccard 指数，两者都为空时返回 0
pub fn jaccard_index(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}
