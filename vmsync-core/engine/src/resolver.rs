//! 对象解析
//!
//! 把期望状态中的名称/路径引用解析为平台清单对象：
//!
//! - UUID 给出时以 UUID 为准，名称与文件夹仅作提示
//! - 文件夹路径先归一化为绝对路径，再做精确匹配，最后退化为
//!   唯一后缀匹配
//! - 按名匹配在文件夹范围内受 name_match 约束，全局范围内受
//!   多候选策略约束
//!
//! 文件夹树用平台上报的扁平记录重建，以索引表避免结构上的
//! 所有权环。

use std::collections::HashMap;

use tracing::{debug, warn};

use vmsync_platform::{Datacenter, FolderEntry, Platform, VmSummary};

use crate::config::{AmbiguityPolicy, EngineConfig};
use crate::error::{EngineError, Result};
use crate::params::{GuestParams, NameMatch};

/// 虚拟机文件夹索引
///
/// folder_id 与绝对路径互为逆映射。绝对路径形如
/// `/<数据中心>/vm/<子文件夹>/...`，数据中心的虚拟机根文件夹
/// 路径固定为 `/<数据中心>/vm`。
#[derive(Debug, Default)]
pub struct FolderIndex {
    path_of: HashMap<String, String>,
    id_of: HashMap<String, String>,
}

impl FolderIndex {
    /// 从扁平文件夹记录重建索引
    ///
    /// 父链走不到虚拟机根文件夹的记录（宿主机文件夹等）被跳过；
    /// 上报数据中出现环时丢弃环上的记录并告警。
    pub fn build(datacenter: &Datacenter, folders: &[FolderEntry]) -> Self {
        let by_id: HashMap<&str, &FolderEntry> =
            folders.iter().map(|f| (f.id.as_str(), f)).collect();

        let root_path = format!("/{}/vm", datacenter.name);
        let mut index = FolderIndex::default();
        index.insert(&datacenter.vm_folder_id, root_path.clone());

        for folder in folders {
            if index.path_of.contains_key(&folder.id) {
                continue;
            }

            // 沿父链回溯到已入索引的祖先（根文件夹已预先入索引），
            // 途中记录访问过的节点防环
            let mut chain = Vec::new();
            let mut cursor = Some(folder);
            let resolved = loop {
                let Some(entry) = cursor else {
                    break None;
                };
                if let Some(path) = index.path_of.get(&entry.id) {
                    break Some(path.clone());
                }
                if chain.iter().any(|c: &&FolderEntry| c.id == entry.id) {
                    warn!("文件夹记录存在环，丢弃: {}", entry.id);
                    break None;
                }
                chain.push(entry);
                let Some(pid) = entry.parent_id.as_deref() else {
                    break None;
                };
                if let Some(path) = index.path_of.get(pid) {
                    break Some(path.clone());
                }
                cursor = by_id.get(pid).copied();
            };

            if let Some(mut path) = resolved {
                for entry in chain.into_iter().rev() {
                    path = format!("{}/{}", path, entry.name);
                    index.insert(&entry.id, path.clone());
                }
            }
        }

        index
    }

    fn insert(&mut self, id: &str, path: String) {
        self.path_of.insert(id.to_string(), path.clone());
        self.id_of.insert(path, id.to_string());
    }

    /// 按绝对路径精确查找
    pub fn find_exact(&self, path: &str) -> Option<&str> {
        self.id_of.get(path).map(String::as_str)
    }

    /// 查 folder_id 的绝对路径
    pub fn path_of(&self, folder_id: &str) -> Option<&str> {
        self.path_of.get(folder_id).map(String::as_str)
    }

    /// 按路径后缀匹配
    ///
    /// 返回全部命中的 folder_id；多候选时由调用方按策略裁决。
    pub fn match_suffix(&self, suffix: &str) -> Vec<&str> {
        let mut hits: Vec<(&str, &str)> = self
            .id_of
            .iter()
            .filter(|(path, _)| path.as_str() == suffix || path.ends_with(&format!("/{}", suffix.trim_start_matches('/'))))
            .map(|(path, id)| (path.as_str(), id.as_str()))
            .collect();
        hits.sort_by_key(|(path, _)| *path);
        hits.into_iter().map(|(_, id)| id).collect()
    }

    /// 索引内的文件夹数
    pub fn len(&self) -> usize {
        self.path_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path_of.is_empty()
    }
}

/// 把用户给出的文件夹路径归一化为绝对路径
///
/// 接受的写法（dc 为数据中心名）：`folder`、`/folder`、`vm/folder`、
/// `/vm/folder`、`/dc/vm/folder`，全部归一到 `/dc/vm/folder`。
pub fn normalize_folder_path(datacenter: &str, folder: &str) -> String {
    let trimmed = folder.trim_end_matches('/');
    if trimmed.is_empty() || trimmed == "/" {
        return format!("/{}/vm", datacenter);
    }

    let with_slash = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    };

    let dc_root = format!("/{}/vm", datacenter);
    if with_slash == dc_root || with_slash.starts_with(&format!("{}/", dc_root)) {
        with_slash
    } else if with_slash == "/vm" || with_slash.starts_with("/vm/") {
        format!("/{}{}", datacenter, with_slash)
    } else {
        format!("{}{}", dc_root, with_slash)
    }
}

/// 对象解析器
pub struct ObjectResolver<'a> {
    platform: &'a dyn Platform,
    config: &'a EngineConfig,
}

impl<'a> ObjectResolver<'a> {
    pub fn new(platform: &'a dyn Platform, config: &'a EngineConfig) -> Self {
        Self { platform, config }
    }

    /// 读取数据中心并重建其文件夹索引
    pub async fn folder_index(&self, datacenter: &str) -> Result<(Datacenter, FolderIndex)> {
        let dc = self
            .platform
            .find_datacenter(datacenter)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("数据中心不存在: {}", datacenter)))?;
        let folders = self.platform.list_folders(&dc.id).await?;
        let index = FolderIndex::build(&dc, &folders);
        debug!("文件夹索引重建完成: {} 个文件夹", index.len());
        Ok((dc, index))
    }

    /// 在索引中解析文件夹路径
    ///
    /// 先精确匹配归一化后的绝对路径，再做后缀匹配；多候选按策略
    /// 裁决，零候选返回 None。
    pub fn resolve_folder(
        &self,
        index: &FolderIndex,
        datacenter: &str,
        folder: &str,
    ) -> Result<Option<String>> {
        let normalized = normalize_folder_path(datacenter, folder);
        if let Some(id) = index.find_exact(&normalized) {
            return Ok(Some(id.to_string()));
        }

        let suffix = folder.trim_end_matches('/').trim_start_matches('/');
        if suffix.is_empty() {
            return Ok(None);
        }
        let hits = index.match_suffix(suffix);
        match hits.len() {
            0 => Ok(None),
            1 => Ok(Some(hits[0].to_string())),
            n => match self.config.ambiguity {
                AmbiguityPolicy::First => Ok(Some(hits[0].to_string())),
                AmbiguityPolicy::Fail => Err(EngineError::Ambiguous(format!(
                    "文件夹路径匹配到 {} 个候选: {}",
                    n, folder
                ))),
            },
        }
    }

    /// 解析文件夹路径，要求必须命中
    pub fn resolve_folder_strict(
        &self,
        index: &FolderIndex,
        datacenter: &str,
        folder: &str,
    ) -> Result<String> {
        self.resolve_folder(index, datacenter, folder)?
            .ok_or_else(|| EngineError::NotFound(format!("文件夹不存在: {}", folder)))
    }

    /// 按期望状态参数解析虚拟机
    ///
    /// UUID 优先，命中即短路。否则按名称查找：文件夹给出且可解析
    /// 时先扫描该文件夹的直接成员（枚举顺序第一个命中即返回）；
    /// 文件夹内无命中时，显式的 name_match 退化为全局按名查找取
    /// 第一个/最后一个；都不适用时全局多候选按策略裁决。
    pub async fn resolve_vm(&self, params: &GuestParams) -> Result<Option<VmSummary>> {
        if let Some(uuid) = &params.uuid {
            debug!("按 UUID 解析虚拟机: {}", uuid);
            return Ok(self.platform.find_vm_by_uuid(uuid).await?);
        }

        let name = params
            .name
            .as_deref()
            .ok_or_else(|| EngineError::Validation("name 与 uuid 至少需要提供一个".to_string()))?;

        // 文件夹限定范围；路径解析不到时退化为全局按名查找
        let scope = match &params.folder {
            Some(folder) => {
                let (_, index) = self.folder_index(&params.datacenter).await?;
                let resolved = self.resolve_folder(&index, &params.datacenter, folder)?;
                if resolved.is_none() {
                    warn!("文件夹路径无匹配，退化为全局按名查找: {}", folder);
                }
                resolved
            }
            None => None,
        };

        let all = self.platform.list_vms().await?;
        let mut candidates: Vec<VmSummary> =
            all.into_iter().filter(|vm| vm.name == name).collect();

        if let Some(folder_id) = &scope {
            if let Some(pos) = candidates
                .iter()
                .position(|vm| vm.folder_id.as_deref() == Some(folder_id.as_str()))
            {
                return Ok(Some(candidates.remove(pos)));
            }
            debug!("文件夹内无同名虚拟机，按 name_match 退化: {}", name);
        }

        match (candidates.len(), params.name_match) {
            (0, _) => Ok(None),
            (_, Some(NameMatch::First)) => Ok(Some(candidates.remove(0))),
            (n, Some(NameMatch::Last)) => Ok(Some(candidates.remove(n - 1))),
            (1, None) => Ok(Some(candidates.remove(0))),
            (n, None) => match self.config.ambiguity {
                AmbiguityPolicy::First => Ok(Some(candidates.remove(0))),
                AmbiguityPolicy::Fail => Err(EngineError::Ambiguous(format!(
                    "存在 {} 台同名虚拟机: {}，请用 name_match、folder 或 uuid 限定",
                    n, name
                ))),
            },
        }
    }
}
