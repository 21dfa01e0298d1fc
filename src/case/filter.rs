use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::case::types::TestCaseRecord;

/// 用例筛选条件
///
/// 不同维度之间取交集，同一维度的多个值取并集。
/// 选中用例的前置用例（递归）会被自动带上，保证依赖链完整。
#[derive(Debug, Clone, Default)]
pub struct CaseFilter {
    pub modules: Vec<String>,
    pub tags: Vec<String>,
    pub priorities: Vec<String>,
    pub ids: Vec<String>,
    pub keyword: Option<String>,
}

impl CaseFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
            && self.tags.is_empty()
            && self.priorities.is_empty()
            && self.ids.is_empty()
            && self.keyword.is_none()
    }

    /// 单条用例是否直接命中筛选条件
    pub fn matches(&self, record: &TestCaseRecord) -> bool {
        let module_ok = self.modules.is_empty()
            || record
                .module
                .as_deref()
                .is_some_and(|m| self.modules.iter().any(|want| want.eq_ignore_ascii_case(m)));

        let tag_ok = self.tags.is_empty()
            || record
                .tags
                .iter()
                .any(|tag| self.tags.iter().any(|want| want.eq_ignore_ascii_case(tag)));

        let priority_ok = self.priorities.is_empty()
            || record
                .priority
                .as_deref()
                .is_some_and(|p| self.priorities.iter().any(|want| want.eq_ignore_ascii_case(p)));

        let id_ok = self.ids.is_empty() || self.ids.iter().any(|id| id == &record.id);

        let keyword_ok = match &self.keyword {
            None => true,
            Some(keyword) => {
                let keyword = keyword.to_lowercase();
                [
                    Some(record.id.as_str()),
                    record.name.as_deref(),
                    record.description.as_deref(),
                    Some(record.path.as_str()),
                ]
                .into_iter()
                .flatten()
                .any(|text| text.to_lowercase().contains(&keyword))
            }
        };

        module_ok && tag_ok && priority_ok && id_ok && keyword_ok
    }

    /// 应用筛选，保持输入顺序
    pub fn apply(&self, records: Vec<TestCaseRecord>) -> Vec<TestCaseRecord> {
        if self.is_empty() {
            return records;
        }

        let by_id: HashMap<&str, &TestCaseRecord> =
            records.iter().map(|r| (r.id.as_str(), r)).collect();

        let mut selected: HashSet<String> = HashSet::new();
        for record in records.iter().filter(|r| self.matches(r)) {
            let mut current = Some(record);
            // 沿前置链向上补齐；遇到已选中的节点即停止，也避免环导致死循环
            while let Some(node) = current {
                if !selected.insert(node.id.clone()) {
                    break;
                }
                current = node.prerequisite().and_then(|id| by_id.get(id).copied());
            }
        }

        debug!(selected = selected.len(), total = records.len(), "filter applied");

        records
            .into_iter()
            .filter(|r| selected.contains(&r.id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;

    fn records() -> Vec<TestCaseRecord> {
        vec![
            TestCaseRecord::new("login", Method::Post, "/login").with_module("auth"),
            TestCaseRecord::new("create_order", Method::Post, "/orders")
                .with_module("order")
                .with_prerequisite("login")
                .with_tag("smoke"),
            TestCaseRecord::new("get_order", Method::Get, "/orders/${order_id}")
                .with_module("order")
                .with_prerequisite("create_order")
                .with_name("查询订单详情"),
            TestCaseRecord::new("health", Method::Get, "/health").with_tag("smoke"),
        ]
    }

    fn ids(records: &[TestCaseRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        let filtered = CaseFilter::new().apply(records());
        assert_eq!(filtered.len(), 4);
    }

    #[test]
    fn test_filter_by_id_pulls_prerequisite_chain() {
        let filter = CaseFilter {
            ids: vec!["get_order".to_string()],
            ..Default::default()
        };
        let filtered = filter.apply(records());
        assert_eq!(ids(&filtered), vec!["login", "create_order", "get_order"]);
    }

    #[test]
    fn test_filter_by_tag() {
        let filter = CaseFilter {
            tags: vec!["SMOKE".to_string()],
            ..Default::default()
        };
        let filtered = filter.apply(records());
        assert_eq!(ids(&filtered), vec!["login", "create_order", "health"]);
    }

    #[test]
    fn test_filter_dimensions_intersect() {
        let filter = CaseFilter {
            modules: vec!["order".to_string()],
            keyword: Some("详情".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&records()[2]));
        assert!(!filter.matches(&records()[1]));
    }

    #[test]
    fn test_filter_tolerates_prerequisite_cycle() {
        let cyclic = vec![
            TestCaseRecord::new("a", Method::Get, "/a").with_prerequisite("b"),
            TestCaseRecord::new("b", Method::Get, "/b").with_prerequisite("a"),
        ];
        let filter = CaseFilter {
            ids: vec!["a".to_string()],
            ..Default::default()
        };
        assert_eq!(filter.apply(cyclic).len(), 2);
    }
}
