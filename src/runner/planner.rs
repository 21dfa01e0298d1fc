use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::case::TestCaseRecord;

/// 整个运行级别的依赖解析错误，出现时不执行任何用例
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("prerequisite cycle detected: {}", cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },

    #[error("duplicate test case id: {0}")]
    DuplicateId(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// 前置用例不存在
    Missing,
    /// 前置用例已禁用
    Disabled,
}

/// 单条用例的前置依赖无法解析，仅该用例被跳过
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedPrerequisite {
    pub prerequisite: String,
    pub reason: UnresolvedReason,
}

impl fmt::Display for UnresolvedPrerequisite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            UnresolvedReason::Missing => write!(f, "'{}' does not exist", self.prerequisite),
            UnresolvedReason::Disabled => write!(f, "'{}' is disabled", self.prerequisite),
        }
    }
}

/// 执行计划
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    /// 拓扑序：每条用例都排在它的所有前置用例之后，同层保持输入顺序
    order: Vec<String>,
    /// 已解析的直接前置用例；前置链按需沿此展开
    prerequisites: HashMap<String, String>,
    unresolved: HashMap<String, UnresolvedPrerequisite>,
}

impl ExecutionPlan {
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// 用例的前置链，按必须完成的先后排列，不含自身
    pub fn chain(&self, id: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = id;
        while let Some(prerequisite) = self.prerequisites.get(current) {
            chain.push(prerequisite.clone());
            current = prerequisite;
        }
        chain.reverse();
        chain
    }

    pub fn unresolved(&self, id: &str) -> Option<&UnresolvedPrerequisite> {
        self.unresolved.get(id)
    }

    /// 没有前置用例、可以立即执行的用例
    pub fn ready(&self) -> impl Iterator<Item = &str> {
        self.order
            .iter()
            .filter(|id| {
                !self.prerequisites.contains_key(*id) && !self.unresolved.contains_key(*id)
            })
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// 依赖解析器
pub struct DependencyResolver;

impl DependencyResolver {
    /// 解析已启用用例的前置依赖，生成执行计划
    ///
    /// 禁用的记录不参与运行；引用禁用或不存在用例的记录只影响自身。
    pub fn resolve(records: &[TestCaseRecord]) -> Result<ExecutionPlan, ResolveError> {
        let mut enabled: HashMap<&str, &TestCaseRecord> = HashMap::new();
        let mut disabled: HashSet<&str> = HashSet::new();

        for record in records {
            if !record.enabled {
                disabled.insert(record.id.as_str());
            } else if enabled.insert(record.id.as_str(), record).is_some() {
                return Err(ResolveError::DuplicateId(record.id.clone()));
            }
        }

        let mut walker = Walker {
            enabled: &enabled,
            disabled: &disabled,
            marks: HashMap::new(),
            stack: Vec::new(),
            plan: ExecutionPlan::default(),
        };

        for record in records.iter().filter(|r| r.enabled) {
            if !walker.marks.contains_key(record.id.as_str()) {
                walker.walk(record)?;
            }
        }

        let plan = walker.plan;
        debug!(
            cases = plan.len(),
            unresolved = plan.unresolved.len(),
            "execution plan resolved"
        );
        Ok(plan)
    }
}

/// 三色深度优先遍历：未访问（不在 marks 中）、进行中、已完成
///
/// 每条用例至多一个前置，遍历路径就是一条链，用显式栈保存，
/// 链再长也不会耗尽调用栈。
struct Walker<'a> {
    enabled: &'a HashMap<&'a str, &'a TestCaseRecord>,
    disabled: &'a HashSet<&'a str>,
    marks: HashMap<&'a str, Mark>,
    stack: Vec<&'a TestCaseRecord>,
    plan: ExecutionPlan,
}

impl<'a> Walker<'a> {
    fn walk(&mut self, root: &'a TestCaseRecord) -> Result<(), ResolveError> {
        let enabled = self.enabled;
        let mut current = root;

        // 沿前置链向下，直到遇到已完成、无前置或无法解析的用例
        loop {
            let id = current.id.as_str();
            self.marks.insert(id, Mark::InProgress);
            self.stack.push(current);

            let Some(prerequisite) = current.prerequisite() else {
                break;
            };
            match enabled.get(prerequisite) {
                Some(&target) => match self.marks.get(prerequisite).copied() {
                    None => current = target,
                    Some(Mark::InProgress) => return Err(self.cycle_to(prerequisite)),
                    Some(Mark::Done) => break,
                },
                None => {
                    let reason = if self.disabled.contains(prerequisite) {
                        UnresolvedReason::Disabled
                    } else {
                        UnresolvedReason::Missing
                    };
                    let unresolved = UnresolvedPrerequisite {
                        prerequisite: prerequisite.to_string(),
                        reason,
                    };
                    warn!(case_id = %id, "unresolved prerequisite: {}", unresolved);
                    self.plan.unresolved.insert(id.to_string(), unresolved);
                    break;
                }
            }
        }

        // 由深到浅完成：前置用例总是先进入拓扑序
        while let Some(record) = self.stack.pop() {
            let id = record.id.as_str();
            self.marks.insert(id, Mark::Done);
            if let Some(prerequisite) = record.prerequisite()
                && enabled.contains_key(prerequisite)
            {
                self.plan
                    .prerequisites
                    .insert(id.to_string(), prerequisite.to_string());
            }
            self.plan.order.push(id.to_string());
        }
        Ok(())
    }

    fn cycle_to(&self, target: &str) -> ResolveError {
        let start = self
            .stack
            .iter()
            .position(|record| record.id == target)
            .unwrap_or(0);
        let mut cycle: Vec<String> = self.stack[start..]
            .iter()
            .map(|record| record.id.clone())
            .collect();
        cycle.push(target.to_string());
        ResolveError::Cycle { cycle }
    }
}
