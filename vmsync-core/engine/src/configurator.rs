//! 硬件与设备期望的翻译
//!
//! 把期望状态参数翻译为配置文档片段：磁盘容量解析与变更、网卡
//! 变更与 Guest 定制文档。所有容量统一换算到 KB 再比较。

use ipnet::IpNet;
use std::net::IpAddr;
use tracing::debug;

use vmsync_platform::{
    AdapterMapping, CustomizationSpec, DeviceChangeSpec, GlobalIpSettings, LinuxIdentity,
    NicAdapterType, Platform, VmSummary,
};

use crate::device;
use crate::error::{EngineError, Result};
use crate::params::{DiskParam, GuestParams, NetworkParam};

/// 解析磁盘容量期望，统一换算为 KB
///
/// 两种写法：`size = "40gb"`（数值加单位后缀），或 `size_gb = 40`
/// 等按单位拆分的字段。按 size、size_tb、size_gb、size_mb、size_kb
/// 的顺序取第一个给出的值。
pub fn parse_disk_capacity_kb(disk: &DiskParam) -> Result<u64> {
    if let Some(size) = &disk.size {
        let trimmed = size.trim().to_lowercase();
        let split_at = trimmed
            .find(|c: char| c.is_ascii_alphabetic())
            .ok_or_else(|| {
                EngineError::Validation(format!("磁盘容量缺少单位后缀: {}", size))
            })?;
        let (number, unit) = trimmed.split_at(split_at);
        let value: f64 = number.trim().parse().map_err(|_| {
            EngineError::Validation(format!("磁盘容量数值不合法: {}", size))
        })?;
        return capacity_to_kb(value, unit);
    }

    if let Some(tb) = disk.size_tb {
        return Ok(tb * 1024 * 1024 * 1024);
    }
    if let Some(gb) = disk.size_gb {
        return Ok(gb * 1024 * 1024);
    }
    if let Some(mb) = disk.size_mb {
        return Ok(mb * 1024);
    }
    if let Some(kb) = disk.size_kb {
        return Ok(kb);
    }

    Err(EngineError::Validation(
        "磁盘条目未指定容量".to_string(),
    ))
}

fn capacity_to_kb(value: f64, unit: &str) -> Result<u64> {
    if value < 0.0 {
        return Err(EngineError::Validation(format!(
            "磁盘容量不能为负: {}",
            value
        )));
    }
    let kb = match unit {
        "b" => value / 1024.0,
        "kb" => value,
        "mb" => value * 1024.0,
        "gb" => value * 1024.0 * 1024.0,
        "tb" => value * 1024.0 * 1024.0 * 1024.0,
        other => {
            return Err(EngineError::Validation(format!(
                "未知的磁盘容量单位: {}，支持 b/kb/mb/gb/tb",
                other
            )))
        }
    };
    Ok(kb.round() as u64)
}

/// 校验单条网卡期望
///
/// 键必须是合法的 CIDR 网段；静态 IP 必须落在该网段内；适配器
/// 型号只接受 vmxnet3 与 e1000。
pub fn validate_network_entry(cidr: &str, param: &NetworkParam) -> Result<(IpNet, NicAdapterType)> {
    let net: IpNet = cidr.parse().map_err(|_| {
        EngineError::Validation(format!("网络键不是合法的 CIDR 网段: {}", cidr))
    })?;

    if let Some(ip) = &param.ip {
        let addr: IpAddr = ip.parse().map_err(|_| {
            EngineError::Validation(format!("静态 IP 不合法: {}", ip))
        })?;
        if !net.contains(&addr) {
            return Err(EngineError::Validation(format!(
                "静态 IP {} 不在网段 {} 内",
                ip, cidr
            )));
        }
    }

    let adapter = match param.device_type.as_deref() {
        None | Some("vmxnet3") => NicAdapterType::Vmxnet3,
        Some("e1000") => NicAdapterType::E1000,
        Some(other) => {
            return Err(EngineError::Validation(format!(
                "未知的网卡适配器型号: {}，支持 vmxnet3/e1000",
                other
            )))
        }
    };

    Ok((net, adapter))
}

/// 期望设备配置的翻译器
pub struct Configurator<'a> {
    platform: &'a dyn Platform,
}

impl<'a> Configurator<'a> {
    pub fn new(platform: &'a dyn Platform) -> Self {
        Self { platform }
    }

    /// 翻译网卡期望
    ///
    /// 来源虚拟机（模板或既有机器）上的网卡先全部移除，再按网段
    /// 键的字典序逐条新建，保证网卡顺序与定制条目顺序一致。返回
    /// 设备变更与可选的 Guest 定制文档。
    pub async fn plan_networks(
        &self,
        params: &GuestParams,
        source: Option<&VmSummary>,
    ) -> Result<(Vec<DeviceChangeSpec>, Option<CustomizationSpec>)> {
        if params.networks.is_empty() {
            return Ok((Vec::new(), None));
        }

        let mut changes = Vec::new();
        if let Some(vm) = source {
            for nic in vm.nic_devices() {
                debug!("移除来源网卡: {} ({})", nic.label, nic.mac_address);
                changes.push(device::remove_device(nic.key));
            }
        }

        let mut nic_settings = Vec::new();
        for (nic_index, (cidr, param)) in params.networks.iter().enumerate() {
            let (net, adapter) = validate_network_entry(cidr, param)?;

            let network = self
                .platform
                .find_network(&param.network)
                .await?
                .ok_or_else(|| {
                    EngineError::NotFound(format!("网络不存在: {}", param.network))
                })?;

            changes.push(device::add_nic(adapter, &network, nic_index));

            nic_settings.push(AdapterMapping {
                ip: param.ip.clone(),
                subnet_mask: param.ip.as_ref().map(|_| net.netmask().to_string()),
                gateway: param.gateway.clone(),
                dns_domain: params
                    .customization
                    .as_ref()
                    .and_then(|c| c.domain.clone()),
            });
        }

        let wants_customization =
            params.customization.is_some() || params.networks.values().any(|n| n.ip.is_some());
        if !wants_customization {
            return Ok((changes, None));
        }

        let custom = params.customization.clone().unwrap_or_default();
        let host_name = custom
            .hostname
            .or_else(|| params.name.clone())
            .ok_or_else(|| {
                EngineError::Validation("定制需要 hostname 或虚拟机名称".to_string())
            })?;

        let spec = CustomizationSpec {
            nic_settings,
            global_ip: GlobalIpSettings {
                dns_servers: custom.dns_servers,
                dns_suffixes: custom.dns_suffixes,
            },
            identity: LinuxIdentity {
                host_name,
                domain: custom.domain.unwrap_or_default(),
            },
        };

        Ok((changes, Some(spec)))
    }

    /// 翻译磁盘期望
    ///
    /// 只处理第一个磁盘条目。来源虚拟机存在首盘时按容量对比决定
    /// 扩容或保持不变，缩容直接拒绝；没有来源盘时新建控制器加
    /// 新盘。
    pub fn plan_disk(
        &self,
        params: &GuestParams,
        source: Option<&VmSummary>,
    ) -> Result<Vec<DeviceChangeSpec>> {
        let Some(disk) = params.disk.first() else {
            return Ok(Vec::new());
        };

        let desired_kb = parse_disk_capacity_kb(disk)?;
        let thin = disk.disk_type.as_deref() == Some("thin");

        match source.and_then(|vm| vm.first_disk()) {
            Some(existing) => {
                if desired_kb < existing.capacity_kb {
                    return Err(EngineError::Validation(format!(
                        "不支持磁盘缩容: 期望 {} KB，当前 {} KB",
                        desired_kb, existing.capacity_kb
                    )));
                }
                if desired_kb == existing.capacity_kb {
                    return Ok(Vec::new());
                }
                Ok(vec![device::grow_disk(
                    existing.key,
                    desired_kb,
                    existing.thin_provisioned,
                )])
            }
            None => Ok(vec![
                device::add_scsi_controller(),
                device::add_disk(0, desired_kb, thin),
            ]),
        }
    }
}
