//! 分页描述

use serde::{Deserialize, Serialize};

/// 默认每页大小
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// 分页
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paging<T> {
    /// 当前页数据
    pub rows: Vec<T>,
    /// 当前页，从1开始
    pub page: usize,
    /// 每页大小
    pub size: usize,
    /// 总页数
    pub total: usize,
    /// 总记录数，为0时查询会重新统计
    pub record: usize,
    /// 增量分页的最后更新时间
    #[serde(default, skip_serializing_if = "is_zero")]
    pub update: i64,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

impl<T> Default for Paging<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            page: 0,
            size: 0,
            total: 0,
            record: 0,
            update: 0,
        }
    }
}

impl<T> Paging<T> {
    pub fn new(page: usize, size: usize) -> Self {
        Self {
            page,
            size,
            ..Default::default()
        }
    }

    /// 规范化页码和每页大小，大小不超过 `max_size`
    pub fn init(&mut self, max_size: usize) {
        if self.page == 0 {
            self.page = 1;
        }
        if self.size == 0 || self.size > max_size {
            self.size = max_size;
        }
    }

    /// 根据总记录数计算总页数
    pub fn result(&mut self, record: usize) {
        if self.size == 0 {
            self.init(DEFAULT_PAGE_SIZE);
        }
        self.record = record;
        self.total = record.div_ceil(self.size);
    }

    /// 当前页起始偏移
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.size)
    }

    /// 遍历第 `page` 页的记录下标
    pub fn range(&self, page: usize, mut handle: impl FnMut(usize)) {
        let page = page.max(1);
        if page > self.total {
            return;
        }
        let start = (page - 1) * self.size;
        if start >= self.record {
            return;
        }
        let end = start.saturating_add(self.size).min(self.record);
        for i in start..end {
            handle(i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_clamps_size() {
        let mut p: Paging<()> = Paging::new(0, 500);
        p.init(100);
        assert_eq!(p.page, 1);
        assert_eq!(p.size, 100);
    }

    #[test]
    fn test_result_ceiling() {
        let mut p: Paging<()> = Paging::new(2, 10);
        p.result(21);
        assert_eq!(p.total, 3);
        assert_eq!(p.offset(), 10);
    }

    #[test]
    fn test_offset_saturates_for_large_page() {
        let p: Paging<()> = Paging::new(usize::MAX, 50);
        assert_eq!(p.offset(), usize::MAX);
    }

    #[test]
    fn test_range_last_page() {
        let mut p: Paging<()> = Paging::new(1, 10);
        p.result(25);
        let mut seen = Vec::new();
        p.range(3, |i| seen.push(i));
        assert_eq!(seen, vec![20, 21, 22, 23, 24]);

        seen.clear();
        p.range(4, |i| seen.push(i));
        assert!(seen.is_empty());
    }
}
