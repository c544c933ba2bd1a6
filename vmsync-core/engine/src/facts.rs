//! 虚拟机事实提取
//!
//! 把一份 [`VmSummary`] 观测快照压平为对外上报的事实文档：
//! 硬件概要、按序编号的网卡条目、Guest 上报的 IPv4/IPv6 地址。

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use vmsync_platform::VmSummary;

/// 单网卡事实
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NicFacts {
    /// MAC 分配方式
    pub address_type: String,

    /// 设备标签
    pub label: String,

    /// MAC 地址（冒号分隔）
    pub mac_address: String,

    /// MAC 地址（连字符分隔）
    pub mac_address_dash: String,

    /// 设备摘要
    pub summary: String,

    /// Guest 上报的该网卡 IP 列表
    pub ip_addresses: Vec<String>,
}

/// 虚拟机事实文档
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestFacts {
    /// 虚拟机名称
    pub name: String,

    /// 电源状态（归一化小写）
    pub power_status: String,

    /// Guest 操作系统完整名称
    pub guest_full_name: String,

    /// Guest 操作系统标识
    pub guest_id: String,

    /// 实例 UUID
    pub product_uuid: String,

    /// CPU 核心数
    pub processor_count: u32,

    /// 内存大小 (MB)
    pub memtotal_mb: u64,

    /// 网卡接口名列表 (eth0, eth1, ...)
    pub interfaces: Vec<String>,

    /// 按接口名索引的网卡事实
    pub nics: BTreeMap<String, NicFacts>,

    /// Guest 上报的 IPv4 地址
    pub ipv4: Option<String>,

    /// Guest 上报的 IPv6 地址
    pub ipv6: Option<String>,
}

/// 从观测快照提取事实文档
///
/// 网卡按设备上报顺序编号为 eth0、eth1……Guest 侧 IP 按 MAC 地址
/// 关联回设备条目。
pub fn gather_facts(vm: &VmSummary) -> GuestFacts {
    let mut interfaces = Vec::new();
    let mut nics = BTreeMap::new();

    for (index, nic) in vm.nic_devices().into_iter().enumerate() {
        let iface = format!("eth{}", index);

        let ip_addresses = vm
            .guest
            .nics
            .iter()
            .find(|g| g.mac_address.eq_ignore_ascii_case(&nic.mac_address))
            .map(|g| g.ip_addresses.clone())
            .unwrap_or_default();

        nics.insert(
            iface.clone(),
            NicFacts {
                address_type: nic.address_type.clone(),
                label: nic.label.clone(),
                mac_address: nic.mac_address.clone(),
                mac_address_dash: nic.mac_address.replace(':', "-"),
                summary: nic.summary.clone(),
                ip_addresses,
            },
        );
        interfaces.push(iface);
    }

    let mut ipv4 = None;
    let mut ipv6 = None;
    for guest_nic in &vm.guest.nics {
        for ip in &guest_nic.ip_addresses {
            match ip.parse::<IpAddr>() {
                Ok(IpAddr::V4(_)) => ipv4 = Some(ip.clone()),
                Ok(IpAddr::V6(_)) => ipv6 = Some(ip.clone()),
                Err(_) => {}
            }
        }
    }

    GuestFacts {
        name: vm.name.clone(),
        power_status: vm.power_state.normalized().to_string(),
        guest_full_name: vm.guest.full_name.clone(),
        guest_id: vm.guest.guest_id.clone(),
        product_uuid: vm.uuid.clone(),
        processor_count: vm.hardware.num_cpu,
        memtotal_mb: vm.hardware.memory_mb,
        interfaces,
        nics,
        ipv4,
        ipv6,
    }
}
