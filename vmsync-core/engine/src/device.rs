//! 设备变更构造
//!
//! 把设备意图翻译成配置文档里的设备变更条目。新建 SCSI 控制器
//! 使用文档内负数临时键值，同一文档中的新建磁盘以该键值挂接，
//! 由平台在应用时替换为真实键值。

use tracing::debug;

use vmsync_platform::{
    DeviceChangeSpec, DeviceOperation, DeviceSpec, DiskSpec, FileOperation, NetworkInfo,
    NicAdapterType, NicBacking, NicSpec, RemoveDeviceSpec, ScsiControllerSpec,
};

/// 新建 SCSI 控制器的文档内临时键值
pub const SCSI_CONTROLLER_TEMP_KEY: i32 = -101;

/// 控制器自身占用的 SCSI 单元号，磁盘编号时跳过
pub const SCSI_CTLR_UNIT_NUMBER: i32 = 7;

const PCI_CONTROLLER_KEY: i32 = 100;
const SCSI_PCI_SLOT_NUMBER: i32 = 16;
const SCSI_PCI_UNIT_NUMBER: i32 = 3;
const SCSI_BUS_NUMBER: i32 = 0;

/// 新建准虚拟化 SCSI 控制器
pub fn add_scsi_controller() -> DeviceChangeSpec {
    DeviceChangeSpec {
        operation: DeviceOperation::Add,
        file_operation: None,
        device: DeviceSpec::ScsiController(ScsiControllerSpec {
            key: SCSI_CONTROLLER_TEMP_KEY,
            bus_number: SCSI_BUS_NUMBER,
            pci_slot_number: SCSI_PCI_SLOT_NUMBER,
            controller_key: PCI_CONTROLLER_KEY,
            unit_number: SCSI_PCI_UNIT_NUMBER,
            scsi_ctlr_unit_number: SCSI_CTLR_UNIT_NUMBER,
            hot_add_remove: true,
            shared_bus: "noSharing".to_string(),
        }),
    }
}

/// 磁盘在控制器上的单元号，跳过控制器自身占用的 7 号位
pub fn disk_unit_number(disk_index: usize) -> i32 {
    let index = disk_index as i32;
    if index >= SCSI_CTLR_UNIT_NUMBER {
        index + 1
    } else {
        index
    }
}

/// 新建磁盘，挂接到同文档中新建的 SCSI 控制器
pub fn add_disk(disk_index: usize, capacity_kb: u64, thin_provisioned: bool) -> DeviceChangeSpec {
    debug!("新建磁盘: 第 {} 块, {} KB", disk_index, capacity_kb);
    DeviceChangeSpec {
        operation: DeviceOperation::Add,
        file_operation: Some(FileOperation::Create),
        device: DeviceSpec::Disk(DiskSpec {
            key: None,
            controller_key: Some(SCSI_CONTROLLER_TEMP_KEY),
            unit_number: Some(disk_unit_number(disk_index)),
            capacity_kb: Some(capacity_kb),
            disk_mode: "persistent".to_string(),
            thin_provisioned,
        }),
    }
}

/// 扩容既有磁盘
pub fn grow_disk(device_key: i32, capacity_kb: u64, thin_provisioned: bool) -> DeviceChangeSpec {
    debug!("扩容磁盘: 键值 {}, 目标 {} KB", device_key, capacity_kb);
    DeviceChangeSpec {
        operation: DeviceOperation::Edit,
        file_operation: None,
        device: DeviceSpec::Disk(DiskSpec {
            key: Some(device_key),
            controller_key: None,
            unit_number: None,
            capacity_kb: Some(capacity_kb),
            disk_mode: "persistent".to_string(),
            thin_provisioned,
        }),
    }
}

/// 新建网卡
///
/// 分布式端口组网络走分布式端口后端，否则走标准端口组后端。
pub fn add_nic(
    adapter_type: NicAdapterType,
    network: &NetworkInfo,
    nic_index: usize,
) -> DeviceChangeSpec {
    let backing = match &network.distributed {
        Some(dvs) => NicBacking::DistributedPort {
            portgroup_key: dvs.portgroup_key.clone(),
            switch_uuid: dvs.switch_uuid.clone(),
        },
        None => NicBacking::Standard {
            network_id: network.id.clone(),
            device_name: network.name.clone(),
        },
    };

    DeviceChangeSpec {
        operation: DeviceOperation::Add,
        file_operation: None,
        device: DeviceSpec::Nic(NicSpec {
            adapter_type,
            label: format!("Network adapter {}", nic_index + 1),
            summary: network.name.clone(),
            wake_on_lan: true,
            address_type: "assigned".to_string(),
            start_connected: true,
            allow_guest_control: true,
            backing,
        }),
    }
}

/// 移除既有设备
pub fn remove_device(device_key: i32) -> DeviceChangeSpec {
    DeviceChangeSpec {
        operation: DeviceOperation::Remove,
        file_operation: None,
        device: DeviceSpec::Existing(RemoveDeviceSpec { key: device_key }),
    }
}
