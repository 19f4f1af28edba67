//! 预算门控：存储字节、录音条数、累计花费三个维度独立判定
//!
//! 纯函数；阈值为 0 表示该维度不限（余量为正无穷）。超出指用量严格大于阈值。

use serde::Serialize;

use crate::store::{ContainerFilter, Store, StoreError, UnitFilter};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// 预算阈值（0 = 不限）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Thresholds {
    pub storage_bytes: u64,
    pub record_count: u64,
    pub spend_limit: f64,
    pub price_per_gb: f64,
}

/// 当前用量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UsageMetrics {
    /// 本地仍存在的录音字节数
    pub local_bytes: u64,
    /// 本地仍存在的录音条数
    pub local_count: u64,
    /// 已上传容器的累计字节数
    pub uploaded_bytes: u64,
}

impl UsageMetrics {
    pub fn collect(store: &dyn Store) -> Result<Self, StoreError> {
        let local = store.list_units(UnitFilter::local())?;
        let uploaded = store.list_containers(ContainerFilter::uploaded())?;
        Ok(Self {
            local_bytes: local.iter().map(|u| u.size_bytes).sum(),
            local_count: local.len() as u64,
            uploaded_bytes: uploaded.iter().map(|c| c.size_bytes).sum(),
        })
    }

    pub fn uploaded_gb(&self) -> f64 {
        self.uploaded_bytes as f64 / BYTES_PER_GB
    }
}

/// 判定结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BudgetVerdict {
    pub storage_exceeded: bool,
    pub count_exceeded: bool,
    pub spend_exceeded: bool,
    pub storage_headroom: f64,
    pub count_headroom: f64,
    pub spend_headroom: f64,
    /// 当前累计花费
    pub spend: f64,
}

impl BudgetVerdict {
    /// 存储或条数超出：需要一次清理
    pub fn needs_cleanup(&self) -> bool {
        self.storage_exceeded || self.count_exceeded
    }

    pub fn any_exceeded(&self) -> bool {
        self.needs_cleanup() || self.spend_exceeded
    }
}

fn headroom(limit: f64, used: f64) -> f64 {
    if limit == 0.0 {
        f64::INFINITY
    } else {
        limit - used
    }
}

/// 三个维度独立计算
pub fn evaluate(metrics: &UsageMetrics, thresholds: &Thresholds) -> BudgetVerdict {
    let spend = metrics.uploaded_gb() * thresholds.price_per_gb;

    let storage_headroom = headroom(thresholds.storage_bytes as f64, metrics.local_bytes as f64);
    let count_headroom = headroom(thresholds.record_count as f64, metrics.local_count as f64);
    let spend_headroom = headroom(thresholds.spend_limit, spend);

    BudgetVerdict {
        storage_exceeded: storage_headroom < 0.0,
        count_exceeded: count_headroom < 0.0,
        spend_exceeded: spend_headroom < 0.0,
        storage_headroom,
        count_headroom,
        spend_headroom,
        spend,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CaptureUnit, Container, ContainerId, InMemoryStore};
    use chrono::Utc;
    use std::path::PathBuf;

    const GB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn test_zero_thresholds_always_pass() {
        let unlimited = Thresholds {
            storage_bytes: 0,
            record_count: 0,
            spend_limit: 0.0,
            price_per_gb: 0.5,
        };
        for metrics in [
            UsageMetrics::default(),
            UsageMetrics {
                local_bytes: u64::MAX / 2,
                local_count: 1_000_000,
                uploaded_bytes: 10_000 * GB,
            },
        ] {
            let v = evaluate(&metrics, &unlimited);
            assert!(!v.any_exceeded());
            assert!(v.storage_headroom.is_infinite());
            assert!(v.count_headroom.is_infinite());
            assert!(v.spend_headroom.is_infinite());
        }
    }

    #[test]
    fn test_only_the_exceeded_dimension_is_reported() {
        let t = Thresholds {
            storage_bytes: 100,
            record_count: 5,
            spend_limit: 10.0,
            price_per_gb: 0.5,
        };

        let v = evaluate(
            &UsageMetrics {
                local_bytes: 101,
                local_count: 1,
                uploaded_bytes: 0,
            },
            &t,
        );
        assert!(v.storage_exceeded && !v.count_exceeded && !v.spend_exceeded);

        let v = evaluate(
            &UsageMetrics {
                local_bytes: 10,
                local_count: 6,
                uploaded_bytes: 0,
            },
            &t,
        );
        assert!(!v.storage_exceeded && v.count_exceeded && !v.spend_exceeded);
        assert!(v.needs_cleanup());

        let v = evaluate(
            &UsageMetrics {
                local_bytes: 10,
                local_count: 1,
                uploaded_bytes: 30 * GB,
            },
            &t,
        );
        assert!(!v.storage_exceeded && !v.count_exceeded && v.spend_exceeded);
        assert!(!v.needs_cleanup());
    }

    #[test]
    fn test_limit_reached_exactly_is_not_exceeded() {
        let t = Thresholds {
            storage_bytes: 0,
            record_count: 5,
            spend_limit: 0.0,
            price_per_gb: 0.0,
        };
        let v = evaluate(
            &UsageMetrics {
                local_count: 5,
                ..Default::default()
            },
            &t,
        );
        assert!(!v.count_exceeded);
        assert_eq!(v.count_headroom, 0.0);
    }

    #[test]
    fn test_spend_scenario() {
        // $10 上限，$0.50/GB，已上传 30 GB → $15
        let t = Thresholds {
            storage_bytes: 0,
            record_count: 0,
            spend_limit: 10.0,
            price_per_gb: 0.5,
        };
        let v = evaluate(
            &UsageMetrics {
                uploaded_bytes: 30 * GB,
                ..Default::default()
            },
            &t,
        );
        assert!(v.spend_exceeded);
        assert!((v.spend - 15.0).abs() < 1e-9);
        assert!((v.spend_headroom + 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_collect_counts_only_local_units_and_uploaded_containers() {
        let store = InMemoryStore::new();
        let mut gone = CaptureUnit::new(PathBuf::from("a.wav"), Utc::now(), Utc::now(), 7);
        gone.locally_present = false;
        store.insert_unit(&gone).unwrap();
        store
            .insert_unit(&CaptureUnit::new(PathBuf::from("b.wav"), Utc::now(), Utc::now(), 11))
            .unwrap();

        let mut up = Container::new(ContainerId::new(), PathBuf::from("u.zip"), 100);
        up.mark_uploaded("https://b.s3-r.amazonaws.com/u.zip".into());
        store.insert_container(&up).unwrap();
        store
            .insert_container(&Container::new(ContainerId::new(), PathBuf::from("l.zip"), 50))
            .unwrap();

        let m = UsageMetrics::collect(&store).unwrap();
        assert_eq!(
            m,
            UsageMetrics {
                local_bytes: 11,
                local_count: 1,
                uploaded_bytes: 100,
            }
        );
    }
}
