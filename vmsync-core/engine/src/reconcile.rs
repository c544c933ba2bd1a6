//! 调和主流程
//!
//! 一次调和运行：解析虚拟机，对照期望状态决定销毁、部署或电源
//! 变更，所有平台侧变更走任务提交加轮询。运行结果统一收敛为
//! [`ReconcileOutcome`]，引擎内部错误也转为带 failed 标记的结果，
//! 不向调用方抛出。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use vmsync_platform::{
    CloneSpec, ConfigSpec, Platform, PowerState, RelocateSpec, VmSummary,
};

use crate::config::EngineConfig;
use crate::configurator::Configurator;
use crate::error::{EngineError, Result};
use crate::facts::{gather_facts, GuestFacts};
use crate::params::{GuestParams, GuestState, SnapshotOp};
use crate::resolver::ObjectResolver;
use crate::snapshot::SnapshotManager;
use crate::task::TaskOrchestrator;

/// 一次调和运行的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    /// 是否发生了实际变更
    pub changed: bool,

    /// 是否失败
    pub failed: bool,

    /// 结果说明
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,

    /// 虚拟机事实文档（虚拟机存在时附带）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<GuestFacts>,

    /// 快照列表（仅快照列举操作返回）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_data: Option<Vec<String>>,

    /// 当前快照描述（仅当前快照查询返回）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_snapshot: Option<String>,
}

impl ReconcileOutcome {
    /// 发生变更的成功结果
    pub fn changed(msg: impl Into<String>) -> Self {
        Self {
            changed: true,
            failed: false,
            msg: Some(msg.into()),
            instance: None,
            snapshot_data: None,
            current_snapshot: None,
        }
    }

    /// 无变更的成功结果
    pub fn unchanged(msg: impl Into<String>) -> Self {
        Self {
            changed: false,
            failed: false,
            msg: Some(msg.into()),
            instance: None,
            snapshot_data: None,
            current_snapshot: None,
        }
    }

    /// 未变更的失败结果（拒绝执行）
    pub fn refused(msg: impl Into<String>) -> Self {
        Self {
            changed: false,
            failed: true,
            msg: Some(msg.into()),
            instance: None,
            snapshot_data: None,
            current_snapshot: None,
        }
    }

    fn with_instance(mut self, facts: GuestFacts) -> Self {
        self.instance = Some(facts);
        self
    }
}

impl From<EngineError> for ReconcileOutcome {
    fn from(err: EngineError) -> Self {
        ReconcileOutcome::refused(err.to_string())
    }
}

/// 调和器
pub struct Reconciler {
    platform: Arc<dyn Platform>,
    config: EngineConfig,
}

impl Reconciler {
    pub fn new(platform: Arc<dyn Platform>, config: EngineConfig) -> Self {
        Self { platform, config }
    }

    /// 执行一次调和运行
    ///
    /// 引擎内部错误不外抛，统一转为 failed 结果。
    pub async fn run(&self, params: &GuestParams) -> ReconcileOutcome {
        match self.execute(params).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("调和运行失败: {}", err);
                err.into()
            }
        }
    }

    /// 对既有虚拟机执行一次快照操作
    pub async fn run_snapshot(&self, params: &GuestParams, op: &SnapshotOp) -> ReconcileOutcome {
        let result = async {
            params.validate()?;
            let resolver = ObjectResolver::new(self.platform.as_ref(), &self.config);
            let vm = resolver.resolve_vm(params).await?.ok_or_else(|| {
                EngineError::NotFound(format!(
                    "虚拟机不存在: {}",
                    params.name.as_deref().or(params.uuid.as_deref()).unwrap_or("?")
                ))
            })?;
            let manager = SnapshotManager::new(self.platform.as_ref(), &self.config);
            manager.run_op(&vm, op).await
        }
        .await;

        match result {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("快照操作失败: {}", err);
                err.into()
            }
        }
    }

    async fn execute(&self, params: &GuestParams) -> Result<ReconcileOutcome> {
        params.validate()?;

        let resolver = ObjectResolver::new(self.platform.as_ref(), &self.config);
        let vm = resolver.resolve_vm(params).await?;

        match (vm, params.state) {
            (Some(vm), GuestState::Absent) => self.remove(&vm, params).await,
            (None, GuestState::Absent) => {
                Ok(ReconcileOutcome::unchanged("虚拟机不存在，无需处理"))
            }
            (Some(vm), GuestState::Present) => {
                debug!("虚拟机已存在，无需变更: {}", vm.name);
                Ok(ReconcileOutcome::unchanged("虚拟机已存在")
                    .with_instance(gather_facts(&vm)))
            }
            (Some(vm), _) => self.set_power_state(&vm, params).await,
            (None, _) => self.deploy(params).await,
        }
    }

    /// 销毁虚拟机
    ///
    /// 开机状态下未加 force 直接拒绝；加 force 先关机再销毁。
    async fn remove(&self, vm: &VmSummary, params: &GuestParams) -> Result<ReconcileOutcome> {
        let tasks = TaskOrchestrator::new(self.platform.as_ref(), &self.config);

        if vm.power_state != PowerState::PoweredOff {
            if !params.force {
                return Ok(ReconcileOutcome::refused(format!(
                    "虚拟机 {} 处于 {} 状态，销毁需要 force",
                    vm.name,
                    vm.power_state.normalized()
                )));
            }
            info!("force 销毁: 先关机 {}", vm.name);
            let handle = self.platform.power_off(&vm.id).await?;
            tasks.run(&handle).await?;
        }

        info!("销毁虚拟机: {}", vm.name);
        let handle = self.platform.destroy(&vm.id).await?;
        tasks.run(&handle).await?;
        Ok(ReconcileOutcome::changed(format!("虚拟机已销毁: {}", vm.name)))
    }

    /// 把虚拟机推向期望电源状态
    ///
    /// 当前状态不是稳定的开/关机状态（挂起、各种进行中）时未加
    /// force 拒绝操作；重启只允许从开机或正在开机/复位的状态出发。
    /// 变更后按 UUID 重新查询，事实文档来自最新观测。
    async fn set_power_state(
        &self,
        vm: &VmSummary,
        params: &GuestParams,
    ) -> Result<ReconcileOutcome> {
        let tasks = TaskOrchestrator::new(self.platform.as_ref(), &self.config);
        let current = vm.power_state;

        let handle = match params.state {
            GuestState::PoweredOn => {
                if current == PowerState::PoweredOn {
                    return Ok(ReconcileOutcome::unchanged("虚拟机已处于开机状态")
                        .with_instance(gather_facts(vm)));
                }
                if !current.is_settled() && !params.force {
                    return Ok(ReconcileOutcome::refused(format!(
                        "电源状态 {} 不是稳定的开/关机状态，操作需要 force",
                        current.normalized()
                    )));
                }
                self.platform.power_on(&vm.id).await?
            }
            GuestState::PoweredOff => {
                if current == PowerState::PoweredOff {
                    return Ok(ReconcileOutcome::unchanged("虚拟机已处于关机状态")
                        .with_instance(gather_facts(vm)));
                }
                if !current.is_settled() && !params.force {
                    return Ok(ReconcileOutcome::refused(format!(
                        "电源状态 {} 不是稳定的开/关机状态，操作需要 force",
                        current.normalized()
                    )));
                }
                self.platform.power_off(&vm.id).await?
            }
            GuestState::Restarted => {
                let restartable = matches!(
                    current,
                    PowerState::PoweredOn | PowerState::PoweringOn | PowerState::Resetting
                );
                if !restartable {
                    return Ok(ReconcileOutcome::refused(format!(
                        "无法从 {} 状态重启，虚拟机需要处于开机状态",
                        current.normalized()
                    )));
                }
                self.platform.reset(&vm.id).await?
            }
            // Present/Absent/Suspended 不会走到这里
            _ => {
                return Ok(ReconcileOutcome::unchanged("电源状态无需变更")
                    .with_instance(gather_facts(vm)))
            }
        };

        tasks.run(&handle).await?;

        // 变更后的事实必须来自重新观测
        let refreshed = self
            .platform
            .find_vm_by_uuid(&vm.uuid)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("电源变更后虚拟机消失: {}", vm.uuid))
            })?;

        Ok(
            ReconcileOutcome::changed(format!(
                "电源状态已变更: {} -> {:?}",
                current.normalized(),
                params.state
            ))
            .with_instance(gather_facts(&refreshed)),
        )
    }

    /// 部署虚拟机（模板克隆或全新创建）
    async fn deploy(&self, params: &GuestParams) -> Result<ReconcileOutcome> {
        let name = params.name.clone().ok_or_else(|| {
            EngineError::Validation("部署虚拟机需要提供 name".to_string())
        })?;

        let resolver = ObjectResolver::new(self.platform.as_ref(), &self.config);
        let configurator = Configurator::new(self.platform.as_ref());
        let tasks = TaskOrchestrator::new(self.platform.as_ref(), &self.config);

        // 放置解析：文件夹、主机、资源池
        let (dc, index) = resolver.folder_index(&params.datacenter).await?;
        let folder_id = match &params.folder {
            Some(folder) => resolver.resolve_folder_strict(&index, &params.datacenter, folder)?,
            None => dc.vm_folder_id.clone(),
        };

        let host_id = match (&params.cluster, &params.esxi_hostname) {
            (Some(cluster_name), None) => {
                let cluster = self
                    .platform
                    .find_cluster(cluster_name)
                    .await?
                    .ok_or_else(|| {
                        EngineError::NotFound(format!("集群不存在: {}", cluster_name))
                    })?;
                cluster.host_ids.first().cloned().ok_or_else(|| {
                    EngineError::NotFound(format!("集群内无可用主机: {}", cluster_name))
                })?
            }
            (None, Some(host_name)) => {
                self.platform
                    .find_host(host_name)
                    .await?
                    .ok_or_else(|| EngineError::NotFound(format!("主机不存在: {}", host_name)))?
                    .id
            }
            _ => {
                return Err(EngineError::Validation(
                    "部署虚拟机需要提供 cluster 或 esxi_hostname 之一".to_string(),
                ))
            }
        };

        let host = self.platform.get_host(&host_id).await?;
        let pools = self.platform.list_resource_pools().await?;
        let pool_id = pools
            .into_iter()
            .find(|p| p.parent_id == host.parent_id)
            .map(|p| p.id)
            .ok_or_else(|| {
                EngineError::NotFound(format!("主机 {} 所在计算资源没有资源池", host.name))
            })?;

        let vm_id = match &params.template {
            Some(template_name) => {
                self.clone_from_template(
                    params,
                    &name,
                    template_name,
                    &folder_id,
                    &host_id,
                    &pool_id,
                    &configurator,
                    &tasks,
                )
                .await?
            }
            None => {
                self.create_fresh(params, &name, &folder_id, &pool_id, &configurator, &tasks)
                    .await?
            }
        };

        // 备注通过部署后的第二次重配置写入
        if let Some(annotation) = &params.annotation {
            debug!("写入备注: {}", name);
            let spec = ConfigSpec::builder().annotation(annotation).freeze();
            let handle = self.platform.reconfigure_vm(&vm_id, &spec).await?;
            tasks.run(&handle).await?;
        }

        if params.state == GuestState::PoweredOn || params.state == GuestState::Restarted {
            let handle = self.platform.power_on(&vm_id).await?;
            tasks.run(&handle).await?;

            if params.wait_for_ip_address {
                self.wait_for_vm_ip(&vm_id).await?;
            }
        }

        let deployed = self.platform.get_vm(&vm_id).await?;
        info!("虚拟机部署完成: {} ({})", deployed.name, deployed.uuid);
        Ok(ReconcileOutcome::changed(format!("虚拟机已部署: {}", name))
            .with_instance(gather_facts(&deployed)))
    }

    #[allow(clippy::too_many_arguments)]
    async fn clone_from_template(
        &self,
        params: &GuestParams,
        name: &str,
        template_name: &str,
        folder_id: &str,
        host_id: &str,
        pool_id: &str,
        configurator: &Configurator<'_>,
        tasks: &TaskOrchestrator<'_>,
    ) -> Result<String> {
        let template = self
            .platform
            .find_template(template_name)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("模板不存在: {}", template_name)))?;

        // 数据存储：未指定时退回模板首盘所在的数据存储
        let datastore_id = match &params.datastore {
            Some(ds_name) => {
                self.platform
                    .find_datastore(ds_name)
                    .await?
                    .ok_or_else(|| {
                        EngineError::NotFound(format!("数据存储不存在: {}", ds_name))
                    })?
                    .id
            }
            None => template
                .first_disk()
                .and_then(|d| d.datastore_id.clone())
                .ok_or_else(|| {
                    EngineError::NotFound(
                        "未指定数据存储，且模板首盘没有数据存储信息".to_string(),
                    )
                })?,
        };

        let mut builder = ConfigSpec::builder();
        if let Some(hw) = &params.hardware {
            if let Some(cpus) = hw.num_cpus {
                builder = builder.num_cpus(cpus);
            }
            if let Some(mem) = hw.memory_mb {
                builder = builder.memory_mb(mem);
            }
            builder = builder.hot_add(hw.hotadd_cpu, hw.hotadd_memory);
        }

        let disk_changes = configurator.plan_disk(params, Some(&template))?;
        let (nic_changes, customization) =
            configurator.plan_networks(params, Some(&template)).await?;
        builder = builder.device_changes(disk_changes).device_changes(nic_changes);

        let clone_spec = CloneSpec {
            template: params.is_template,
            location: RelocateSpec {
                host_id: host_id.to_string(),
                datastore_id,
                pool_id: pool_id.to_string(),
            },
            config: Some(builder.freeze()),
            customization,
        };

        info!("从模板克隆: {} -> {}", template_name, name);
        let handle = self
            .platform
            .clone_vm(&template.id, folder_id, name, &clone_spec)
            .await?;
        let task = tasks.run(&handle).await?;
        task.result_vm_id.ok_or_else(|| {
            EngineError::RemoteTask("克隆任务成功但未返回虚拟机 ID".to_string())
        })
    }

    async fn create_fresh(
        &self,
        params: &GuestParams,
        name: &str,
        folder_id: &str,
        pool_id: &str,
        configurator: &Configurator<'_>,
        tasks: &TaskOrchestrator<'_>,
    ) -> Result<String> {
        let hw = params.hardware.as_ref().ok_or_else(|| {
            EngineError::Validation("全新创建需要提供 hardware 配置".to_string())
        })?;
        let num_cpus = hw.num_cpus.ok_or_else(|| {
            EngineError::Validation("全新创建需要指定 num_cpus".to_string())
        })?;
        let memory_mb = hw.memory_mb.ok_or_else(|| {
            EngineError::Validation("全新创建需要指定 memory_mb".to_string())
        })?;
        let ds_name = params.datastore.as_ref().ok_or_else(|| {
            EngineError::Validation("全新创建需要指定 datastore".to_string())
        })?;

        let datastore = self
            .platform
            .find_datastore(ds_name)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("数据存储不存在: {}", ds_name)))?;

        let disk_changes = configurator.plan_disk(params, None)?;
        // 全新创建没有 Guest 可定制，网卡定制文档被忽略
        let (nic_changes, _) = configurator.plan_networks(params, None).await?;

        let spec = ConfigSpec::builder()
            .name(name)
            .num_cpus(num_cpus)
            .memory_mb(memory_mb)
            .hot_add(hw.hotadd_cpu, hw.hotadd_memory)
            .device_changes(disk_changes)
            .device_changes(nic_changes)
            .files(format!("[{}] {}", datastore.name, name))
            .freeze();

        info!("全新创建虚拟机: {}", name);
        let handle = self.platform.create_vm(folder_id, pool_id, &spec).await?;
        let task = tasks.run(&handle).await?;
        task.result_vm_id.ok_or_else(|| {
            EngineError::RemoteTask("创建任务成功但未返回虚拟机 ID".to_string())
        })
    }

    /// 等待 Guest 上报 IP 地址
    ///
    /// 尽力而为：轮询次数耗尽后照常返回，不视为失败。
    async fn wait_for_vm_ip(&self, vm_id: &str) -> Result<()> {
        for attempt in 0..self.config.ip_poll_count {
            let vm = self.platform.get_vm(vm_id).await?;
            let facts = gather_facts(&vm);
            if facts.ipv4.is_some() || facts.ipv6.is_some() {
                debug!("Guest IP 已上报: {:?}/{:?}", facts.ipv4, facts.ipv6);
                return Ok(());
            }
            debug!("等待 Guest IP 上报: 第 {} 次", attempt + 1);
            sleep(self.config.ip_poll_interval).await;
        }
        warn!("等待 Guest IP 超时，继续返回: {}", vm_id);
        Ok(())
    }
}
