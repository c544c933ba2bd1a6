//! 快照管理
//!
//! 快照树由平台整棵上报，这里只做树上的纯查找加任务提交。按名
//! 查找对整棵树做先序遍历，同名多候选按策略裁决；删除与恢复在
//! 零匹配时是信息性空操作，不算失败。

use tracing::{debug, info};

use vmsync_platform::{Platform, SnapshotInfo, SnapshotNode, VmSummary};

use crate::config::{AmbiguityPolicy, EngineConfig};
use crate::error::{EngineError, Result};
use crate::params::{SnapshotOp, SnapshotOpType};
use crate::reconcile::ReconcileOutcome;
use crate::task::TaskOrchestrator;

/// 单行快照描述
pub fn describe(node: &SnapshotNode) -> String {
    format!(
        "Id: {}; Name: {}; Description: {}; CreateTime: {}; State: {}",
        node.id,
        node.name,
        node.description,
        node.create_time.to_rfc3339(),
        node.state.normalized()
    )
}

/// 先序遍历整棵快照树，每个快照一行描述
pub fn list_recursively(info: &SnapshotInfo) -> Vec<String> {
    fn walk(nodes: &[SnapshotNode], out: &mut Vec<String>) {
        for node in nodes {
            out.push(describe(node));
            walk(&node.children, out);
        }
    }
    let mut out = Vec::new();
    walk(&info.root_snapshots, &mut out);
    out
}

/// 按名称在整棵树中查找快照
///
/// 零匹配返回 None；多匹配按策略裁决，First 取先序遍历中的第一个。
pub fn find_by_name<'t>(
    info: &'t SnapshotInfo,
    name: &str,
    policy: AmbiguityPolicy,
) -> Result<Option<&'t SnapshotNode>> {
    fn walk<'t>(nodes: &'t [SnapshotNode], name: &str, hits: &mut Vec<&'t SnapshotNode>) {
        for node in nodes {
            if node.name == name {
                hits.push(node);
            }
            walk(&node.children, name, hits);
        }
    }
    let mut hits = Vec::new();
    walk(&info.root_snapshots, name, &mut hits);

    match hits.len() {
        0 => Ok(None),
        1 => Ok(Some(hits[0])),
        n => match policy {
            AmbiguityPolicy::First => Ok(Some(hits[0])),
            AmbiguityPolicy::Fail => Err(EngineError::Ambiguous(format!(
                "存在 {} 个同名快照: {}",
                n, name
            ))),
        },
    }
}

/// 查找当前快照指针指向的节点
pub fn find_current(info: &SnapshotInfo) -> Option<&SnapshotNode> {
    let current_id = info.current_snapshot_id.as_deref()?;
    fn walk<'t>(nodes: &'t [SnapshotNode], id: &str) -> Option<&'t SnapshotNode> {
        for node in nodes {
            if node.id == id {
                return Some(node);
            }
            if let Some(found) = walk(&node.children, id) {
                return Some(found);
            }
        }
        None
    }
    walk(&info.root_snapshots, current_id)
}

/// 快照管理器
pub struct SnapshotManager<'a> {
    platform: &'a dyn Platform,
    config: &'a EngineConfig,
}

impl<'a> SnapshotManager<'a> {
    pub fn new(platform: &'a dyn Platform, config: &'a EngineConfig) -> Self {
        Self { platform, config }
    }

    /// 执行一次快照操作
    pub async fn run_op(&self, vm: &VmSummary, op: &SnapshotOp) -> Result<ReconcileOutcome> {
        let empty = SnapshotInfo {
            current_snapshot_id: None,
            root_snapshots: Vec::new(),
        };
        let tree = vm.snapshot.as_ref().unwrap_or(&empty);
        let tasks = TaskOrchestrator::new(self.platform, self.config);

        match op.op {
            SnapshotOpType::Create => {
                let name = required_name(op)?;
                info!("创建快照: {} -> {}", vm.name, name);
                let handle = self
                    .platform
                    .create_snapshot(&vm.id, name, op.description.as_deref().unwrap_or(""))
                    .await?;
                tasks.run(&handle).await?;
                Ok(ReconcileOutcome::changed(format!("快照已创建: {}", name)))
            }
            SnapshotOpType::Remove => {
                let name = required_name(op)?;
                match find_by_name(tree, name, self.config.ambiguity)? {
                    Some(node) => {
                        info!("删除快照: {} -> {}", vm.name, name);
                        let handle = self
                            .platform
                            .remove_snapshot(&vm.id, &node.id, op.remove_children)
                            .await?;
                        tasks.run(&handle).await?;
                        Ok(ReconcileOutcome::changed(format!("快照已删除: {}", name)))
                    }
                    None => {
                        debug!("快照不存在，跳过删除: {}", name);
                        Ok(ReconcileOutcome::unchanged(format!(
                            "未找到名为 {} 的快照",
                            name
                        )))
                    }
                }
            }
            SnapshotOpType::Revert => {
                let name = required_name(op)?;
                match find_by_name(tree, name, self.config.ambiguity)? {
                    Some(node) => {
                        info!("恢复到快照: {} -> {}", vm.name, name);
                        let handle = self.platform.revert_snapshot(&vm.id, &node.id).await?;
                        tasks.run(&handle).await?;
                        Ok(ReconcileOutcome::changed(format!("已恢复到快照: {}", name)))
                    }
                    None => Ok(ReconcileOutcome::unchanged(format!(
                        "未找到名为 {} 的快照",
                        name
                    ))),
                }
            }
            SnapshotOpType::ListAll => {
                let mut outcome = ReconcileOutcome::unchanged("快照列表");
                outcome.snapshot_data = Some(list_recursively(tree));
                Ok(outcome)
            }
            SnapshotOpType::ListCurrent => {
                let mut outcome = ReconcileOutcome::unchanged("当前快照");
                outcome.current_snapshot = find_current(tree).map(describe);
                Ok(outcome)
            }
            SnapshotOpType::RemoveAll => {
                if tree.root_snapshots.is_empty() {
                    debug!("虚拟机没有快照，跳过删除: {}", vm.name);
                    return Ok(ReconcileOutcome::unchanged("虚拟机没有快照"));
                }
                info!("删除全部快照: {}", vm.name);
                let handle = self.platform.remove_all_snapshots(&vm.id).await?;
                tasks.run(&handle).await?;
                Ok(ReconcileOutcome::changed("全部快照已删除"))
            }
        }
    }
}

fn required_name(op: &SnapshotOp) -> Result<&str> {
    op.name
        .as_deref()
        .ok_or_else(|| EngineError::Validation("该快照操作需要提供快照名称".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use vmsync_platform::PowerState;

    fn node(id: &str, name: &str, children: Vec<SnapshotNode>) -> SnapshotNode {
        SnapshotNode {
            id: id.to_string(),
            name: name.to_string(),
            description: format!("{} 的描述", name),
            create_time: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            state: PowerState::PoweredOn,
            children,
        }
    }

    fn tree() -> SnapshotInfo {
        SnapshotInfo {
            current_snapshot_id: Some("snap-2".to_string()),
            root_snapshots: vec![node(
                "snap-1",
                "base",
                vec![
                    node("snap-2", "patched", vec![]),
                    node("snap-3", "patched", vec![]),
                ],
            )],
        }
    }

    #[test]
    fn test_list_recursively_preorder() {
        let lines = list_recursively(&tree());
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Id: snap-1; Name: base;"));
        assert!(lines[1].contains("Name: patched"));
        assert!(lines[0].contains("State: poweredon"));
    }

    #[test]
    fn test_find_by_name_unique_and_missing() {
        let tree = tree();
        let hit = find_by_name(&tree, "base", AmbiguityPolicy::Fail).unwrap();
        assert_eq!(hit.unwrap().id, "snap-1");
        assert!(find_by_name(&tree, "nope", AmbiguityPolicy::Fail)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_find_by_name_ambiguity_policy() {
        let tree = tree();
        assert!(matches!(
            find_by_name(&tree, "patched", AmbiguityPolicy::Fail),
            Err(EngineError::Ambiguous(_))
        ));
        let first = find_by_name(&tree, "patched", AmbiguityPolicy::First)
            .unwrap()
            .unwrap();
        assert_eq!(first.id, "snap-2");
    }

    #[test]
    fn test_find_current() {
        let tree = tree();
        assert_eq!(find_current(&tree).unwrap().id, "snap-2");

        let empty = SnapshotInfo {
            current_snapshot_id: None,
            root_snapshots: Vec::new(),
        };
        assert!(find_current(&empty).is_none());
    }
}
