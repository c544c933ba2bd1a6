//! # VMSync 调和引擎
//!
//! 把声明式的期望状态调和到虚拟化控制平面的观测状态上。
//!
//! ## 功能
//!
//! - **对象解析**: UUID 优先查找、文件夹路径归一化与唯一后缀
//!   匹配、同名多候选裁决
//! - **状态调和**: 部署（模板克隆/全新创建）、销毁、电源变更，
//!   全部走任务提交加轮询
//! - **设备翻译**: 磁盘容量解析与扩容、网卡变更与 Guest 定制
//! - **快照管理**: 创建/删除/恢复/列举，树上纯查找
//! - **Guest 操作**: 文件传输与程序执行
//! - **事实提取**: 观测快照压平为对外上报的事实文档
//!
//! ## 示例
//!
//! ```ignore
//! use std::sync::Arc;
//! use vmsync_engine::{EngineConfig, GuestParams, GuestState, Reconciler};
//! use vmsync_platform::{HttpPlatform, PlatformConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let platform = HttpPlatform::new("http://192.168.1.11:8088", PlatformConfig::default())?;
//!     platform.login("admin", "password").await?;
//!
//!     let reconciler = Reconciler::new(Arc::new(platform), EngineConfig::default());
//!     let params = GuestParams {
//!         name: Some("web-01".to_string()),
//!         datacenter: "dc1".to_string(),
//!         state: GuestState::PoweredOn,
//!         ..Default::default()
//!     };
//!     let outcome = reconciler.run(&params).await;
//!     println!("changed={} msg={:?}", outcome.changed, outcome.msg);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod configurator;
pub mod device;
pub mod error;
pub mod facts;
pub mod guest;
pub mod params;
pub mod reconcile;
pub mod resolver;
pub mod snapshot;
pub mod task;

pub use config::{AmbiguityPolicy, EngineConfig};
pub use configurator::{parse_disk_capacity_kb, Configurator};
pub use error::{EngineError, Result};
pub use facts::{gather_facts, GuestFacts, NicFacts};
pub use guest::GuestOps;
pub use params::{
    CustomizationParam, DiskParam, GuestParams, GuestState, HardwareParam, NameMatch,
    NetworkParam, SnapshotOp, SnapshotOpType,
};
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use resolver::{normalize_folder_path, FolderIndex, ObjectResolver};
pub use snapshot::SnapshotManager;
pub use task::TaskOrchestrator;
