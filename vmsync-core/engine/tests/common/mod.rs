//! 集成测试公共设施：内存假控制平面
//!
//! 任务提交立即完成（除非注入失败），变更同步落到内存清单上，
//! 便于测试调和流程的决策路径而不依赖真实平台。

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use vmsync_platform::{
    ClusterInfo, Datacenter, DatastoreInfo, DeviceOperation, DeviceSpec, DiskDevice,
    FileTransferInfo, FolderEntry, GuestCredentials, GuestInfo, GuestNicInfo, GuestProcessInfo,
    GuestProgramSpec, HardwareInfo, HostSystem, NetworkInfo, NicDevice, Platform, PlatformError,
    PowerState, ResourcePool, Result, SnapshotInfo, SnapshotNode, TaskHandle, TaskInfo, TaskState,
    ToolsStatus, VirtualDevice, VmSummary,
};
use vmsync_platform::{CloneSpec, ConfigSpec};

#[derive(Default)]
pub struct FakeState {
    pub vms: Vec<VmSummary>,
    pub datacenters: Vec<Datacenter>,
    pub folders: HashMap<String, Vec<FolderEntry>>,
    pub clusters: Vec<ClusterInfo>,
    pub hosts: Vec<HostSystem>,
    pub pools: Vec<ResourcePool>,
    pub networks: Vec<NetworkInfo>,
    pub datastores: Vec<DatastoreInfo>,
    pub processes: Vec<GuestProcessInfo>,

    /// 已提交的任务类调用，按提交顺序记录
    pub submitted: Vec<String>,

    /// 注入下一个任务的失败消息
    pub fail_next_task: Option<String>,

    tasks: HashMap<String, TaskInfo>,
    task_seq: u32,
    vm_seq: u32,
    snapshot_seq: u32,
}

/// 初始化测试日志输出，重复调用安全
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_test_writer()
        .try_init();
}

pub struct FakePlatform {
    pub state: Mutex<FakeState>,
}

impl FakePlatform {
    pub fn new(state: FakeState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// 标准测试清单：一个数据中心、两层文件夹、集群加独立主机、
    /// 标准与分布式网络、一台模板和一台既有虚拟机
    pub fn with_basic_inventory() -> Self {
        let mut state = FakeState::default();

        state.datacenters.push(Datacenter {
            id: "dc-1".to_string(),
            name: "dc1".to_string(),
            vm_folder_id: "group-v3".to_string(),
        });
        state.folders.insert(
            "dc-1".to_string(),
            vec![
                FolderEntry {
                    id: "folder-10".to_string(),
                    name: "prod".to_string(),
                    parent_id: Some("group-v3".to_string()),
                },
                FolderEntry {
                    id: "folder-11".to_string(),
                    name: "web".to_string(),
                    parent_id: Some("folder-10".to_string()),
                },
            ],
        );

        state.clusters.push(ClusterInfo {
            id: "domain-c7".to_string(),
            name: "cluster1".to_string(),
            host_ids: vec!["host-1".to_string()],
        });
        state.hosts.push(HostSystem {
            id: "host-1".to_string(),
            name: "esxi-01".to_string(),
            parent_id: Some("domain-c7".to_string()),
        });
        state.pools.push(ResourcePool {
            id: "resgroup-8".to_string(),
            name: "Resources".to_string(),
            parent_id: Some("domain-c7".to_string()),
        });

        state.networks.push(NetworkInfo {
            id: "network-7".to_string(),
            name: "VM Network".to_string(),
            distributed: None,
        });
        state.networks.push(NetworkInfo {
            id: "dvportgroup-9".to_string(),
            name: "DSwitch-PG".to_string(),
            distributed: Some(vmsync_platform::DistributedPortgroupInfo {
                portgroup_key: "pg-100".to_string(),
                switch_uuid: "50 2a 04 9e".to_string(),
            }),
        });
        state.datastores.push(DatastoreInfo {
            id: "datastore-5".to_string(),
            name: "ds1".to_string(),
        });

        state.vms.push(make_vm(
            "vm-template",
            "4200aaaa-0000-0000-0000-00000000feed",
            "centos-template",
            Some("group-v3"),
            PowerState::PoweredOff,
            true,
        ));
        state.vms.push(make_vm(
            "vm-100",
            "4200aaaa-0000-0000-0000-000000000001",
            "web-01",
            Some("folder-10"),
            PowerState::PoweredOn,
            false,
        ));

        Self::new(state)
    }

    pub fn submitted(&self) -> Vec<String> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn fail_next_task(&self, msg: &str) {
        self.state.lock().unwrap().fail_next_task = Some(msg.to_string());
    }

    pub fn vm_by_name(&self, name: &str) -> Option<VmSummary> {
        self.state
            .lock()
            .unwrap()
            .vms
            .iter()
            .find(|vm| vm.name == name)
            .cloned()
    }

    pub fn update_vm(&self, name: &str, f: impl FnOnce(&mut VmSummary)) {
        let mut state = self.state.lock().unwrap();
        if let Some(vm) = state.vms.iter_mut().find(|vm| vm.name == name) {
            f(vm);
        }
    }
}

pub fn make_vm(
    id: &str,
    uuid: &str,
    name: &str,
    folder_id: Option<&str>,
    power_state: PowerState,
    is_template: bool,
) -> VmSummary {
    VmSummary {
        id: id.to_string(),
        uuid: uuid.to_string(),
        name: name.to_string(),
        folder_id: folder_id.map(str::to_string),
        host_id: Some("host-1".to_string()),
        is_template,
        power_state,
        guest: GuestInfo {
            full_name: "CentOS 7 (64-bit)".to_string(),
            guest_id: "centos7_64Guest".to_string(),
            tools_status: ToolsStatus::ToolsOk,
            nics: vec![GuestNicInfo {
                mac_address: "00:50:56:aa:bb:01".to_string(),
                ip_addresses: vec!["192.168.10.5".to_string()],
            }],
        },
        hardware: HardwareInfo {
            num_cpu: 2,
            memory_mb: 4096,
            devices: vec![
                VirtualDevice::Disk(DiskDevice {
                    key: 2000,
                    label: "Hard disk 1".to_string(),
                    capacity_kb: 10 * 1024 * 1024,
                    datastore_id: Some("datastore-5".to_string()),
                    thin_provisioned: true,
                }),
                VirtualDevice::Nic(NicDevice {
                    key: 4000,
                    label: "Network adapter 1".to_string(),
                    summary: "VM Network".to_string(),
                    mac_address: "00:50:56:aa:bb:01".to_string(),
                    address_type: "assigned".to_string(),
                }),
            ],
        },
        snapshot: None,
    }
}

impl FakeState {
    fn submit(&mut self, op: &str, result_vm_id: Option<String>) -> TaskHandle {
        self.task_seq += 1;
        let id = format!("task-{}", self.task_seq);
        self.submitted.push(op.to_string());

        let info = match self.fail_next_task.take() {
            Some(msg) => TaskInfo {
                id: id.clone(),
                state: TaskState::Error,
                error_message: Some(msg),
                result_vm_id: None,
            },
            None => TaskInfo {
                id: id.clone(),
                state: TaskState::Success,
                error_message: None,
                result_vm_id,
            },
        };
        self.tasks.insert(id.clone(), info);
        TaskHandle { id }
    }

    fn task_will_fail(&self) -> bool {
        self.fail_next_task.is_some()
    }

    fn vm_mut(&mut self, vm_id: &str) -> Result<&mut VmSummary> {
        self.vms
            .iter_mut()
            .find(|vm| vm.id == vm_id)
            .ok_or_else(|| PlatformError::NotFound(format!("虚拟机: {}", vm_id)))
    }

    fn apply_config(vm: &mut VmSummary, spec: &ConfigSpec) {
        if let Some(cpus) = spec.num_cpus {
            vm.hardware.num_cpu = cpus;
        }
        if let Some(mem) = spec.memory_mb {
            vm.hardware.memory_mb = mem;
        }
        for change in &spec.device_change {
            match (&change.operation, &change.device) {
                (DeviceOperation::Remove, DeviceSpec::Existing(remove)) => {
                    vm.hardware.devices.retain(|d| match d {
                        VirtualDevice::Nic(nic) => nic.key != remove.key,
                        VirtualDevice::Disk(disk) => disk.key != remove.key,
                    });
                }
                (DeviceOperation::Add, DeviceSpec::Nic(nic)) => {
                    let key = 4000 + vm.hardware.devices.len() as i32;
                    vm.hardware.devices.push(VirtualDevice::Nic(NicDevice {
                        key,
                        label: nic.label.clone(),
                        summary: nic.summary.clone(),
                        mac_address: format!("00:50:56:aa:cc:{:02x}", key % 256),
                        address_type: nic.address_type.clone(),
                    }));
                }
                (DeviceOperation::Add, DeviceSpec::Disk(disk)) => {
                    let key = 2000 + vm.hardware.devices.len() as i32;
                    vm.hardware.devices.push(VirtualDevice::Disk(DiskDevice {
                        key,
                        label: "Hard disk".to_string(),
                        capacity_kb: disk.capacity_kb.unwrap_or(0),
                        datastore_id: Some("datastore-5".to_string()),
                        thin_provisioned: disk.thin_provisioned,
                    }));
                }
                (DeviceOperation::Edit, DeviceSpec::Disk(edit)) => {
                    for device in &mut vm.hardware.devices {
                        if let VirtualDevice::Disk(disk) = device {
                            if Some(disk.key) == edit.key {
                                if let Some(kb) = edit.capacity_kb {
                                    disk.capacity_kb = kb;
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

fn remove_snapshot_node(nodes: &mut Vec<SnapshotNode>, id: &str) -> bool {
    if let Some(pos) = nodes.iter().position(|n| n.id == id) {
        let removed = nodes.remove(pos);
        // 不级联时子快照上提
        let children = removed.children;
        nodes.extend(children);
        return true;
    }
    for node in nodes.iter_mut() {
        if remove_snapshot_node(&mut node.children, id) {
            return true;
        }
    }
    false
}

#[async_trait]
impl Platform for FakePlatform {
    async fn find_vm_by_uuid(&self, uuid: &str) -> Result<Option<VmSummary>> {
        let state = self.state.lock().unwrap();
        Ok(state.vms.iter().find(|vm| vm.uuid == uuid).cloned())
    }

    async fn get_vm(&self, vm_id: &str) -> Result<VmSummary> {
        let state = self.state.lock().unwrap();
        state
            .vms
            .iter()
            .find(|vm| vm.id == vm_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("虚拟机: {}", vm_id)))
    }

    async fn list_vms(&self) -> Result<Vec<VmSummary>> {
        Ok(self.state.lock().unwrap().vms.clone())
    }

    async fn find_datacenter(&self, name: &str) -> Result<Option<Datacenter>> {
        let state = self.state.lock().unwrap();
        Ok(state.datacenters.iter().find(|d| d.name == name).cloned())
    }

    async fn list_folders(&self, datacenter_id: &str) -> Result<Vec<FolderEntry>> {
        let state = self.state.lock().unwrap();
        Ok(state.folders.get(datacenter_id).cloned().unwrap_or_default())
    }

    async fn find_cluster(&self, name: &str) -> Result<Option<ClusterInfo>> {
        let state = self.state.lock().unwrap();
        Ok(state.clusters.iter().find(|c| c.name == name).cloned())
    }

    async fn find_host(&self, name: &str) -> Result<Option<HostSystem>> {
        let state = self.state.lock().unwrap();
        Ok(state.hosts.iter().find(|h| h.name == name).cloned())
    }

    async fn get_host(&self, host_id: &str) -> Result<HostSystem> {
        let state = self.state.lock().unwrap();
        state
            .hosts
            .iter()
            .find(|h| h.id == host_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("主机: {}", host_id)))
    }

    async fn list_resource_pools(&self) -> Result<Vec<ResourcePool>> {
        Ok(self.state.lock().unwrap().pools.clone())
    }

    async fn find_network(&self, name: &str) -> Result<Option<NetworkInfo>> {
        let state = self.state.lock().unwrap();
        Ok(state.networks.iter().find(|n| n.name == name).cloned())
    }

    async fn find_datastore(&self, name: &str) -> Result<Option<DatastoreInfo>> {
        let state = self.state.lock().unwrap();
        Ok(state.datastores.iter().find(|d| d.name == name).cloned())
    }

    async fn get_datastore(&self, datastore_id: &str) -> Result<DatastoreInfo> {
        let state = self.state.lock().unwrap();
        state
            .datastores
            .iter()
            .find(|d| d.id == datastore_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("数据存储: {}", datastore_id)))
    }

    async fn find_template(&self, name: &str) -> Result<Option<VmSummary>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .vms
            .iter()
            .find(|vm| vm.is_template && vm.name == name)
            .cloned())
    }

    async fn power_on(&self, vm_id: &str) -> Result<TaskHandle> {
        let mut state = self.state.lock().unwrap();
        if !state.task_will_fail() {
            state.vm_mut(vm_id)?.power_state = PowerState::PoweredOn;
        }
        Ok(state.submit(&format!("power_on {}", vm_id), None))
    }

    async fn power_off(&self, vm_id: &str) -> Result<TaskHandle> {
        let mut state = self.state.lock().unwrap();
        if !state.task_will_fail() {
            state.vm_mut(vm_id)?.power_state = PowerState::PoweredOff;
        }
        Ok(state.submit(&format!("power_off {}", vm_id), None))
    }

    async fn reset(&self, vm_id: &str) -> Result<TaskHandle> {
        let mut state = self.state.lock().unwrap();
        if !state.task_will_fail() {
            state.vm_mut(vm_id)?.power_state = PowerState::PoweredOn;
        }
        Ok(state.submit(&format!("reset {}", vm_id), None))
    }

    async fn destroy(&self, vm_id: &str) -> Result<TaskHandle> {
        let mut state = self.state.lock().unwrap();
        if !state.task_will_fail() {
            state.vms.retain(|vm| vm.id != vm_id);
        }
        Ok(state.submit(&format!("destroy {}", vm_id), None))
    }

    async fn clone_vm(
        &self,
        template_id: &str,
        folder_id: &str,
        name: &str,
        spec: &CloneSpec,
    ) -> Result<TaskHandle> {
        let mut state = self.state.lock().unwrap();
        if state.task_will_fail() {
            return Ok(state.submit(&format!("clone {} -> {}", template_id, name), None));
        }

        let template = state
            .vms
            .iter()
            .find(|vm| vm.id == template_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("模板: {}", template_id)))?;

        state.vm_seq += 1;
        let mut vm = template;
        vm.id = format!("vm-new-{}", state.vm_seq);
        vm.uuid = format!("4200bbbb-0000-0000-0000-{:012}", state.vm_seq);
        vm.name = name.to_string();
        vm.folder_id = Some(folder_id.to_string());
        vm.host_id = Some(spec.location.host_id.clone());
        vm.is_template = spec.template;
        vm.power_state = PowerState::PoweredOff;
        if let Some(config) = &spec.config {
            FakeState::apply_config(&mut vm, config);
        }
        let vm_id = vm.id.clone();
        state.vms.push(vm);
        Ok(state.submit(&format!("clone {} -> {}", template_id, name), Some(vm_id)))
    }

    async fn create_vm(
        &self,
        folder_id: &str,
        pool_id: &str,
        spec: &ConfigSpec,
    ) -> Result<TaskHandle> {
        let mut state = self.state.lock().unwrap();
        let name = spec.name.clone().unwrap_or_default();
        if state.task_will_fail() {
            return Ok(state.submit(&format!("create {} in {}", name, pool_id), None));
        }

        state.vm_seq += 1;
        let mut vm = make_vm(
            &format!("vm-new-{}", state.vm_seq),
            &format!("4200cccc-0000-0000-0000-{:012}", state.vm_seq),
            &name,
            Some(folder_id),
            PowerState::PoweredOff,
            false,
        );
        vm.hardware.devices.clear();
        vm.guest.nics.clear();
        FakeState::apply_config(&mut vm, spec);
        let vm_id = vm.id.clone();
        state.vms.push(vm);
        Ok(state.submit(&format!("create {} in {}", name, pool_id), Some(vm_id)))
    }

    async fn reconfigure_vm(&self, vm_id: &str, spec: &ConfigSpec) -> Result<TaskHandle> {
        let mut state = self.state.lock().unwrap();
        if !state.task_will_fail() {
            let vm = state.vm_mut(vm_id)?;
            FakeState::apply_config(vm, spec);
        }
        let op = match &spec.annotation {
            Some(text) => format!("reconfigure {} annotation={}", vm_id, text),
            None => format!("reconfigure {}", vm_id),
        };
        Ok(state.submit(&op, None))
    }

    async fn create_snapshot(
        &self,
        vm_id: &str,
        name: &str,
        description: &str,
    ) -> Result<TaskHandle> {
        let mut state = self.state.lock().unwrap();
        if !state.task_will_fail() {
            state.snapshot_seq += 1;
            let id = format!("snap-{}", state.snapshot_seq);
            let node = SnapshotNode {
                id: id.clone(),
                name: name.to_string(),
                description: description.to_string(),
                create_time: Utc::now(),
                state: PowerState::PoweredOn,
                children: Vec::new(),
            };
            let vm = state.vm_mut(vm_id)?;
            let info = vm.snapshot.get_or_insert_with(|| SnapshotInfo {
                current_snapshot_id: None,
                root_snapshots: Vec::new(),
            });
            info.root_snapshots.push(node);
            info.current_snapshot_id = Some(id);
        }
        Ok(state.submit(&format!("create_snapshot {} {}", vm_id, name), None))
    }

    async fn remove_snapshot(
        &self,
        vm_id: &str,
        snapshot_id: &str,
        remove_children: bool,
    ) -> Result<TaskHandle> {
        let mut state = self.state.lock().unwrap();
        if !state.task_will_fail() {
            let vm = state.vm_mut(vm_id)?;
            if let Some(info) = &mut vm.snapshot {
                if remove_children {
                    fn drop_subtree(nodes: &mut Vec<SnapshotNode>, id: &str) -> bool {
                        if let Some(pos) = nodes.iter().position(|n| n.id == id) {
                            nodes.remove(pos);
                            return true;
                        }
                        nodes
                            .iter_mut()
                            .any(|n| drop_subtree(&mut n.children, id))
                    }
                    drop_subtree(&mut info.root_snapshots, snapshot_id);
                } else {
                    remove_snapshot_node(&mut info.root_snapshots, snapshot_id);
                }
                if info.current_snapshot_id.as_deref() == Some(snapshot_id) {
                    info.current_snapshot_id = None;
                }
            }
        }
        Ok(state.submit(&format!("remove_snapshot {} {}", vm_id, snapshot_id), None))
    }

    async fn revert_snapshot(&self, vm_id: &str, snapshot_id: &str) -> Result<TaskHandle> {
        let mut state = self.state.lock().unwrap();
        if !state.task_will_fail() {
            let vm = state.vm_mut(vm_id)?;
            if let Some(info) = &mut vm.snapshot {
                info.current_snapshot_id = Some(snapshot_id.to_string());
            }
        }
        Ok(state.submit(&format!("revert_snapshot {} {}", vm_id, snapshot_id), None))
    }

    async fn remove_all_snapshots(&self, vm_id: &str) -> Result<TaskHandle> {
        let mut state = self.state.lock().unwrap();
        if !state.task_will_fail() {
            let vm = state.vm_mut(vm_id)?;
            vm.snapshot = None;
        }
        Ok(state.submit(&format!("remove_all_snapshots {}", vm_id), None))
    }

    async fn get_task(&self, task_id: &str) -> Result<TaskInfo> {
        let state = self.state.lock().unwrap();
        state
            .tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("任务: {}", task_id)))
    }

    async fn guest_file_download(
        &self,
        vm_id: &str,
        _auth: &GuestCredentials,
        guest_path: &str,
    ) -> Result<FileTransferInfo> {
        Ok(FileTransferInfo {
            url: format!("http://fake/{}/download{}", vm_id, guest_path),
            size: 0,
        })
    }

    async fn guest_file_upload(
        &self,
        vm_id: &str,
        _auth: &GuestCredentials,
        guest_path: &str,
        _size: u64,
        _overwrite: bool,
    ) -> Result<String> {
        Ok(format!("http://fake/{}/upload{}", vm_id, guest_path))
    }

    async fn guest_start_program(
        &self,
        _vm_id: &str,
        _auth: &GuestCredentials,
        _spec: &GuestProgramSpec,
    ) -> Result<i64> {
        let state = self.state.lock().unwrap();
        Ok(state.processes.first().map(|p| p.pid).unwrap_or(1))
    }

    async fn guest_list_processes(
        &self,
        _vm_id: &str,
        _auth: &GuestCredentials,
        pids: &[i64],
    ) -> Result<Vec<GuestProcessInfo>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .processes
            .iter()
            .filter(|p| pids.contains(&p.pid))
            .cloned()
            .collect())
    }
}
