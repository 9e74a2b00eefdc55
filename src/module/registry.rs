//! 模块注册表
//!
//! 保存一次加载中构造出的所有模块，按 ID 索引，并保证 ID 唯一。
//! 注册表在加载时于锁外构建，构建完成后整体替换，因此本身不加锁。

use std::collections::HashMap;

use crate::module::descriptor::ModuleDescriptor;
use crate::module::instance::ModuleInstance;
use crate::utils::{CoreError, Result};

/// 注册表中的一项：描述和构造出的实例
#[derive(Debug, Clone)]
pub struct ModuleEntry {
    /// 模块描述
    pub descriptor: ModuleDescriptor,
    /// 模块实例
    pub instance: ModuleInstance,
}

impl ModuleEntry {
    /// 模块 ID
    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    /// 是否参与启停
    pub fn participates(&self) -> bool {
        self.descriptor.start
    }
}

/// 模块注册表
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    /// 按声明顺序保存
    entries: Vec<ModuleEntry>,
    /// module_id -> entries 下标
    index: HashMap<String, usize>,
}

impl ModuleRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册模块
    ///
    /// # Errors
    ///
    /// ID 已存在时返回 `DuplicateIdentity`，注册表保持不变
    pub fn register(&mut self, descriptor: ModuleDescriptor, instance: ModuleInstance) -> Result<()> {
        if self.index.contains_key(&descriptor.id) {
            return Err(CoreError::DuplicateIdentity(descriptor.id));
        }
        self.index.insert(descriptor.id.clone(), self.entries.len());
        self.entries.push(ModuleEntry {
            descriptor,
            instance,
        });
        Ok(())
    }

    /// 按 ID 获取
    ///
    /// # Errors
    ///
    /// 未注册时返回 `ModuleNotFound`
    pub fn get(&self, module_id: &str) -> Result<&ModuleEntry> {
        self.index
            .get(module_id)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| CoreError::ModuleNotFound(module_id.to_string()))
    }

    /// 是否已注册
    pub fn is_loaded(&self, module_id: &str) -> bool {
        self.index.contains_key(module_id)
    }

    /// 所有模块（声明顺序，调用方不应依赖这个顺序做启停）
    pub fn entries(&self) -> impl Iterator<Item = &ModuleEntry> {
        self.entries.iter()
    }

    /// 所有模块 ID
    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id().to_string()).collect()
    }

    /// 按给定顺序取出模块，未知 ID 被跳过
    pub fn ordered(&self, order: &[String]) -> Vec<ModuleEntry> {
        order
            .iter()
            .filter_map(|id| self.index.get(id).map(|&i| self.entries[i].clone()))
            .collect()
    }

    /// 模块数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 清空
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::instance::Module;

    struct Dummy;
    impl Module for Dummy {}

    fn register(registry: &mut ModuleRegistry, id: &str) -> Result<()> {
        registry.register(ModuleDescriptor::new(id), ModuleInstance::new(Dummy))
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = ModuleRegistry::new();
        register(&mut registry, "db").unwrap();

        assert!(registry.is_loaded("db"));
        assert_eq!(registry.get("db").unwrap().id(), "db");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_duplicate() {
        let mut registry = ModuleRegistry::new();
        register(&mut registry, "db").unwrap();

        let err = register(&mut registry, "db").unwrap_err();
        assert!(matches!(err, CoreError::DuplicateIdentity(ref id) if id == "db"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_missing() {
        let registry = ModuleRegistry::new();
        assert!(!registry.is_loaded("nope"));
        assert!(matches!(
            registry.get("nope"),
            Err(CoreError::ModuleNotFound(_))
        ));
    }

    #[test]
    fn test_ordered() {
        let mut registry = ModuleRegistry::new();
        for id in ["a", "b", "c"] {
            register(&mut registry, id).unwrap();
        }

        let order = vec!["c".to_string(), "ghost".to_string(), "a".to_string()];
        let ids: Vec<String> = registry
            .ordered(&order)
            .iter()
            .map(|e| e.id().to_string())
            .collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert_eq!(registry.ids(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_clear() {
        let mut registry = ModuleRegistry::new();
        register(&mut registry, "a").unwrap();
        registry.clear();
        assert!(registry.is_empty());
        assert!(!registry.is_loaded("a"));
    }

    #[test]
    fn test_participates() {
        let mut registry = ModuleRegistry::new();
        registry
            .register(ModuleDescriptor::new("cfg").init_only(), ModuleInstance::new(Dummy))
            .unwrap();
        assert!(!registry.get("cfg").unwrap().participates());
    }
}
