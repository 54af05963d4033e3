//! 任务管理：Plan Mode 下的依赖图任务表
//!
//! create_plan 整体替换任务表（不合并）；get_next_task 按声明顺序线性扫描，
//! 返回第一个依赖全部完成的 pending 任务。计划规模在几十个任务以内，不建索引。

use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// 结果摘要在 plan_summary 中的最大字符数
const RESULT_PREVIEW_CHARS: usize = 100;

/// 任务状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    fn glyph(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "[ ]",
            TaskStatus::InProgress => "[>]",
            TaskStatus::Completed => "[X]",
            TaskStatus::Failed => "[!]",
            TaskStatus::Skipped => "[-]",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        }
    }
}

/// 计划声明中的一项（plan_task 工具的输入）
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct TaskSpec {
    /// Unique ID for the task
    pub id: String,
    /// Description of the task
    pub description: String,
    /// IDs of tasks that must be completed first
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub dependencies: Vec<String>,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl From<TaskSpec> for Task {
    fn from(spec: TaskSpec) -> Self {
        Self {
            id: spec.id,
            description: spec.description,
            dependencies: spec.dependencies,
            status: TaskStatus::Pending,
            result: None,
            error: None,
        }
    }
}

/// 任务表：按插入顺序保存
#[derive(Debug, Default)]
pub struct TaskManager {
    tasks: Vec<Task>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用新计划整体替换任务表；重复 id 保留首次出现的位置、采用后出现的定义
    pub fn create_plan(&mut self, specs: Vec<TaskSpec>) {
        let mut tasks: Vec<Task> = Vec::with_capacity(specs.len());
        for spec in specs {
            let task = Task::from(spec);
            match tasks.iter_mut().find(|t| t.id == task.id) {
                Some(existing) => *existing = task,
                None => tasks.push(task),
            }
        }
        self.tasks = tasks;

        for (task_id, dep) in self.dangling_dependencies() {
            tracing::warn!(task = %task_id, dependency = %dep, "plan declares unknown dependency; task can never run");
        }
    }

    pub fn get_task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// 下一个可执行任务：pending 且所有依赖均为 completed
    pub fn get_next_task(&self) -> Option<&Task> {
        self.tasks.iter().find(|task| {
            task.status == TaskStatus::Pending
                && task.dependencies.iter().all(|dep| {
                    self.get_task(dep)
                        .map(|d| d.status == TaskStatus::Completed)
                        .unwrap_or(false)
                })
        })
    }

    /// 更新状态；不校验状态迁移是否合法。未知 id 返回 UnknownTask 且不做任何修改
    pub fn update_task(
        &mut self,
        id: &str,
        status: TaskStatus,
        result: Option<String>,
        error: Option<String>,
    ) -> Result<(), AgentError> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| AgentError::UnknownTask(id.to_string()))?;
        task.status = status;
        if let Some(r) = result.filter(|r| !r.is_empty()) {
            task.result = Some(r);
        }
        if let Some(e) = error.filter(|e| !e.is_empty()) {
            task.error = Some(e);
        }
        Ok(())
    }

    /// 引用了不存在任务的依赖：(task id, dependency id)
    pub fn dangling_dependencies(&self) -> Vec<(String, String)> {
        let known: HashSet<&str> = self.tasks.iter().map(|t| t.id.as_str()).collect();
        self.tasks
            .iter()
            .flat_map(|t| {
                t.dependencies
                    .iter()
                    .filter(|d| !known.contains(d.as_str()))
                    .map(|d| (t.id.clone(), d.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// 计划状态文本（供 LLM 阅读），按存储顺序输出
    pub fn plan_summary(&self) -> String {
        if self.tasks.is_empty() {
            return "No plan active.".to_string();
        }
        let mut out = String::from("Current Task Plan:\n");
        for task in &self.tasks {
            let deps = if task.dependencies.is_empty() {
                String::new()
            } else {
                format!(" (Deps: {})", task.dependencies.join(", "))
            };
            out.push_str(&format!(
                "{} Task {}: {}{}\n",
                task.status.glyph(),
                task.id,
                task.description,
                deps
            ));
            if let Some(result) = &task.result {
                let preview: String = result.chars().take(RESULT_PREVIEW_CHARS).collect();
                if result.chars().count() > RESULT_PREVIEW_CHARS {
                    out.push_str(&format!("    Result: {}...\n", preview));
                } else {
                    out.push_str(&format!("    Result: {}\n", preview));
                }
            }
            if let Some(error) = &task.error {
                out.push_str(&format!("    Error: {}\n", error));
            }
        }
        out
    }
}
