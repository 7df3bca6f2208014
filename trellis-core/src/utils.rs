//! Utility functions for the container
//!
//! Naming helpers for default bean names, glob matching for member patterns,
//! and dependency graph algorithms used for cycle detection and shutdown ordering.

/// Naming convention utilities for bean names
pub mod naming {
    /// Converts a PascalCase type name to camelCase for bean naming.
    ///
    /// This is the default bean naming strategy: `UserService` becomes `userService`.
    ///
    /// # Examples
    ///
    /// ```
    /// use trellis_core::utils::naming::to_camel_case;
    ///
    /// assert_eq!(to_camel_case("UserService"), "userService");
    /// assert_eq!(to_camel_case("V8Engine"), "v8Engine");
    /// assert_eq!(to_camel_case(""), "");
    /// ```
    pub fn to_camel_case(s: &str) -> String {
        let mut chars = s.chars();
        match chars.next() {
            None => String::new(),
            Some(first) => {
                let mut result = String::with_capacity(s.len());
                result.extend(first.to_lowercase());
                result.push_str(chars.as_str());
                result
            }
        }
    }

    /// Strips module paths from a fully qualified type name, keeping generics.
    ///
    /// # Examples
    ///
    /// ```
    /// use trellis_core::utils::naming::short_type_name;
    ///
    /// assert_eq!(short_type_name("my_app::engine::V8Engine"), "V8Engine");
    /// assert_eq!(short_type_name("dyn my_app::Engine"), "dyn Engine");
    /// assert_eq!(
    ///     short_type_name("alloc::vec::Vec<core::option::Option<my_app::User>>"),
    ///     "Vec<Option<User>>"
    /// );
    /// ```
    pub fn short_type_name(full: &str) -> String {
        let mut result = String::with_capacity(full.len());
        let mut segment_start = 0;
        let mut chars = full.chars().peekable();

        while let Some(ch) = chars.next() {
            if ch == ':' && chars.peek() == Some(&':') {
                chars.next();
                result.truncate(segment_start);
            } else if ch.is_alphanumeric() || ch == '_' {
                result.push(ch);
            } else {
                result.push(ch);
                segment_start = result.len();
            }
        }

        result
    }

    /// Derives the default bean name for a type: short name without generics, camelCased.
    ///
    /// # Examples
    ///
    /// ```
    /// use trellis_core::utils::naming::default_bean_name;
    ///
    /// assert_eq!(default_bean_name("my_app::UserService"), "userService");
    /// assert_eq!(default_bean_name("my_app::Repository<my_app::User>"), "repository");
    /// ```
    pub fn default_bean_name(type_name: &str) -> String {
        let short = short_type_name(type_name);
        let base = short.split('<').next().unwrap_or_default();
        let base = base.rsplit(' ').next().unwrap_or(base);
        to_camel_case(base)
    }
}

/// Glob style matching for member and type patterns
pub mod pattern {
    use regex::Regex;

    /// Matches `target` against a simple glob pattern.
    ///
    /// Supported patterns:
    /// - `*` matches everything
    /// - `find*` matches names starting with `find`
    /// - `*Service` matches names ending with `Service`
    /// - `*cache*` matches names containing `cache`
    ///
    /// Every character other than `*` is matched literally.
    ///
    /// # Examples
    ///
    /// ```
    /// use trellis_core::utils::pattern::glob_matches;
    ///
    /// assert!(glob_matches("find*", "find_user"));
    /// assert!(glob_matches("*.get", "users.get"));
    /// assert!(!glob_matches("*.get", "users_get"));
    /// ```
    pub fn glob_matches(pattern: &str, target: &str) -> bool {
        if pattern == "*" {
            return true;
        }

        if !pattern.contains('*') {
            return pattern == target;
        }

        let escaped: Vec<String> = pattern.split('*').map(regex::escape).collect();
        let regex_pattern = format!("^{}$", escaped.join(".*"));

        match Regex::new(&regex_pattern) {
            Ok(regex) => regex.is_match(target),
            Err(e) => {
                tracing::warn!("Invalid glob pattern '{}': {}", pattern, e);
                false
            }
        }
    }
}

/// Dependency resolution utilities
pub mod dependency {
    use parking_lot::Mutex;
    use std::collections::{BTreeMap, HashMap, HashSet};
    use std::fmt::Display;
    use std::hash::Hash;
    use std::thread::{self, ThreadId};

    /// Tracks beans currently being created, per thread, to detect circular dependencies.
    ///
    /// Besides the creation stack of every thread, the tracker records which key every
    /// blocked thread is waiting for and which thread is creating that key.
    /// A thread about to wait on a key owned by another thread first walks this
    /// wait-for graph; if the walk comes back to itself the wait would deadlock,
    /// and the cycle is reported instead.
    #[derive(Debug)]
    pub struct CreationTracker<K> {
        state: Mutex<TrackerState<K>>,
    }

    #[derive(Debug)]
    struct TrackerState<K> {
        stacks: HashMap<ThreadId, Vec<K>>,
        /// blocked thread -> (awaited key, thread creating it)
        waiting: HashMap<ThreadId, (K, ThreadId)>,
    }

    impl<K> Default for CreationTracker<K> {
        fn default() -> Self {
            Self {
                state: Mutex::new(TrackerState {
                    stacks: HashMap::new(),
                    waiting: HashMap::new(),
                }),
            }
        }
    }

    impl<K: Eq + Hash + Clone + Display> CreationTracker<K> {
        /// Creates a new empty creation tracker.
        pub fn new() -> Self {
            Self::default()
        }

        /// Checks if the current thread is creating `key`.
        pub fn is_creating(&self, key: &K) -> bool {
            let state = self.state.lock();
            state
                .stacks
                .get(&thread::current().id())
                .map(|stack| stack.contains(key))
                .unwrap_or(false)
        }

        /// Marks `key` as being created by the current thread.
        ///
        /// # Errors
        ///
        /// Returns the dependency chain if the current thread is already creating `key`.
        pub fn start_creating(&self, key: &K) -> Result<(), Vec<String>> {
            let current = thread::current().id();
            let mut state = self.state.lock();
            let stack = state.stacks.entry(current).or_default();

            if let Some(pos) = stack.iter().position(|k| k == key) {
                let mut chain: Vec<String> = stack[pos..].iter().map(ToString::to_string).collect();
                chain.push(key.to_string());
                return Err(chain);
            }

            stack.push(key.clone());
            Ok(())
        }

        /// Marks `key` as finished being created by the current thread.
        /// Wait registrations on this creation are dropped with it.
        pub fn finish_creating(&self, key: &K) {
            let current = thread::current().id();
            let mut state = self.state.lock();
            state
                .waiting
                .retain(|_, (waited, owner)| !(waited == key && *owner == current));

            if let Some(stack) = state.stacks.get_mut(&current) {
                if let Some(pos) = stack.iter().rposition(|k| k == key) {
                    stack.remove(pos);
                }
                if stack.is_empty() {
                    state.stacks.remove(&current);
                }
            }
        }

        /// Registers that the current thread is about to wait for `key`, owned by `owner`.
        ///
        /// # Errors
        ///
        /// Returns the cycle if waiting would close a wait-for loop back to the current thread.
        pub fn begin_wait(&self, key: &K, owner: ThreadId) -> Result<(), Vec<String>> {
            let current = thread::current().id();
            let mut state = self.state.lock();

            let mut chain = vec![key.to_string()];
            let mut visited = HashSet::new();
            let mut next_owner = Some(owner);

            while let Some(thread_id) = next_owner {
                if thread_id == current {
                    if let Some(stack) = state.stacks.get(&current) {
                        chain.splice(0..0, stack.iter().map(ToString::to_string));
                    }
                    return Err(chain);
                }
                if !visited.insert(thread_id) {
                    break;
                }
                next_owner = match state.waiting.get(&thread_id) {
                    Some((waited, owner)) => {
                        chain.push(waited.to_string());
                        Some(*owner)
                    }
                    None => None,
                };
            }

            state.waiting.insert(current, (key.clone(), owner));
            Ok(())
        }

        /// Clears the wait registration of the current thread.
        pub fn end_wait(&self) {
            self.state.lock().waiting.remove(&thread::current().id());
        }

        /// Gets a snapshot of the creation stack of the current thread.
        pub fn current_chain(&self) -> Vec<String> {
            let state = self.state.lock();
            state
                .stacks
                .get(&thread::current().id())
                .map(|stack| stack.iter().map(ToString::to_string).collect())
                .unwrap_or_default()
        }
    }

    /// Dependency graph analysis result
    #[derive(Debug)]
    pub enum DependencyValidationError {
        /// Circular dependency detected
        CircularDependency {
            /// The dependency chain forming the cycle
            cycle: Vec<String>,
        },
        /// Missing dependency detected
        MissingDependency {
            /// The bean that requires the dependency
            bean: String,
            /// The missing dependency
            missing: String,
        },
    }

    impl Display for DependencyValidationError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::CircularDependency { cycle } => {
                    write!(f, "Circular dependency detected: {}", cycle.join(" -> "))
                }
                Self::MissingDependency { bean, missing } => {
                    write!(f, "Bean '{}' depends on '{}' which is not registered", bean, missing)
                }
            }
        }
    }

    /// Validates a dependency graph for circular dependencies and missing beans.
    ///
    /// `dependencies` maps every bean name to the names it requires eagerly.
    /// Keys are visited in sorted order so the reported issue is deterministic.
    pub fn validate_dependency_graph(
        dependencies: &HashMap<String, Vec<String>>,
    ) -> Result<(), DependencyValidationError> {
        let mut names: Vec<&String> = dependencies.keys().collect();
        names.sort();

        for bean_name in &names {
            for dep in &dependencies[*bean_name] {
                if !dependencies.contains_key(dep) {
                    return Err(DependencyValidationError::MissingDependency {
                        bean: (*bean_name).clone(),
                        missing: dep.clone(),
                    });
                }
            }
        }

        let mut visited = HashSet::new();
        let mut rec_stack = Vec::new();

        for bean_name in names {
            if !visited.contains(bean_name) {
                if let Some(cycle) =
                    detect_cycle_dfs(bean_name, dependencies, &mut visited, &mut rec_stack)
                {
                    return Err(DependencyValidationError::CircularDependency { cycle });
                }
            }
        }

        Ok(())
    }

    fn detect_cycle_dfs(
        node: &str,
        graph: &HashMap<String, Vec<String>>,
        visited: &mut HashSet<String>,
        rec_stack: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        visited.insert(node.to_string());
        rec_stack.push(node.to_string());

        if let Some(deps) = graph.get(node) {
            for dep in deps {
                if let Some(start_idx) = rec_stack.iter().position(|x| x == dep) {
                    let mut cycle = rec_stack[start_idx..].to_vec();
                    cycle.push(dep.to_string());
                    return Some(cycle);
                }
                if !visited.contains(dep) {
                    if let Some(cycle) = detect_cycle_dfs(dep, graph, visited, rec_stack) {
                        return Some(cycle);
                    }
                }
            }
        }

        rec_stack.pop();
        None
    }

    /// Computes the order in which live beans should be destroyed.
    ///
    /// `created` lists keys in creation order and `dependencies` maps a key to the keys
    /// it depends on. A key is destroyed only after every key depending on it; among
    /// keys that are ready at the same time, the most recently created goes first.
    ///
    /// Returns the full order plus the keys that were stuck in cycles. Those are
    /// appended to the order in reverse creation order.
    pub fn destruction_order<K>(created: &[K], dependencies: &HashMap<K, Vec<K>>) -> (Vec<K>, Vec<K>)
    where
        K: Eq + Hash + Clone,
    {
        let index: HashMap<&K, usize> = created.iter().enumerate().map(|(i, k)| (k, i)).collect();

        // 每个节点仍然存活的依赖方数量
        let mut remaining_dependents = vec![0usize; created.len()];
        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); created.len()];

        for (i, key) in created.iter().enumerate() {
            let mut seen = HashSet::new();
            for dep in dependencies.get(key).into_iter().flatten() {
                if let Some(&j) = index.get(dep) {
                    if j != i && seen.insert(j) {
                        edges[i].push(j);
                        remaining_dependents[j] += 1;
                    }
                }
            }
        }

        let mut ready: BTreeMap<usize, ()> = remaining_dependents
            .iter()
            .enumerate()
            .filter(|(_, &count)| count == 0)
            .map(|(i, _)| (i, ()))
            .collect();

        let mut order = Vec::with_capacity(created.len());
        let mut done = vec![false; created.len()];

        while let Some((&i, _)) = ready.iter().next_back() {
            ready.remove(&i);
            done[i] = true;
            order.push(created[i].clone());

            for &j in &edges[i] {
                remaining_dependents[j] -= 1;
                if remaining_dependents[j] == 0 {
                    ready.insert(j, ());
                }
            }
        }

        let cyclic: Vec<K> = (0..created.len())
            .rev()
            .filter(|&i| !done[i])
            .map(|i| created[i].clone())
            .collect();
        order.extend(cyclic.iter().cloned());

        (order, cyclic)
    }
}

#[cfg(test)]
mod tests {
    mod naming_tests {
        use super::super::naming::*;

        #[test]
        fn test_to_camel_case() {
            assert_eq!(to_camel_case("UserService"), "userService");
            assert_eq!(to_camel_case("A"), "a");
            assert_eq!(to_camel_case(""), "");
            assert_eq!(to_camel_case("lowerCase"), "lowerCase");
        }

        #[test]
        fn test_short_type_name() {
            assert_eq!(short_type_name("V6Engine"), "V6Engine");
            assert_eq!(short_type_name("crate::a::b::Engine"), "Engine");
            assert_eq!(
                short_type_name("std::collections::HashMap<alloc::string::String, u32>"),
                "HashMap<String, u32>"
            );
            assert_eq!(short_type_name("&dyn core::any::Any"), "&dyn Any");
        }

        #[test]
        fn test_default_bean_name() {
            assert_eq!(default_bean_name("app::engine::V8Engine"), "v8Engine");
            assert_eq!(default_bean_name("dyn app::Engine"), "engine");
            assert_eq!(default_bean_name("app::Cache<app::User>"), "cache");
        }
    }

    mod pattern_tests {
        use super::super::pattern::*;

        #[test]
        fn test_glob_matches() {
            assert!(glob_matches("*", "anything"));
            assert!(glob_matches("get_user", "get_user"));
            assert!(!glob_matches("get_user", "get_users"));
            assert!(glob_matches("get*", "get_user"));
            assert!(glob_matches("*_user", "delete_user"));
            assert!(glob_matches("*cache*", "evict_cache_entry"));
            assert!(!glob_matches("save*", "get_user"));
        }

        #[test]
        fn test_glob_escapes_regex_characters() {
            assert!(glob_matches("v1.*", "v1.get"));
            assert!(!glob_matches("v1.*", "v1xget"));
            assert!(glob_matches("(*)", "(x)"));
        }
    }

    mod dependency_tests {
        use super::super::dependency::*;
        use std::collections::HashMap;
        use std::sync::Arc;

        #[test]
        fn test_creation_tracker() {
            let tracker: CreationTracker<String> = CreationTracker::new();
            let a = "serviceA".to_string();
            let b = "serviceB".to_string();

            assert!(!tracker.is_creating(&a));
            assert!(tracker.start_creating(&a).is_ok());
            assert!(tracker.start_creating(&b).is_ok());
            assert!(tracker.is_creating(&a));
            assert_eq!(tracker.current_chain(), vec!["serviceA", "serviceB"]);

            let chain = tracker.start_creating(&a).unwrap_err();
            assert_eq!(chain, vec!["serviceA", "serviceB", "serviceA"]);

            tracker.finish_creating(&b);
            tracker.finish_creating(&a);
            assert!(!tracker.is_creating(&a));
            assert!(tracker.current_chain().is_empty());
        }

        #[test]
        fn test_creation_is_tracked_per_thread() {
            let tracker: Arc<CreationTracker<String>> = Arc::new(CreationTracker::new());
            tracker.start_creating(&"shared".to_string()).unwrap();

            let other = Arc::clone(&tracker);
            let result = std::thread::spawn(move || {
                let key = "shared".to_string();
                let started = other.start_creating(&key);
                other.finish_creating(&key);
                started
            })
            .join()
            .unwrap();

            assert!(result.is_ok());
            assert!(tracker.is_creating(&"shared".to_string()));
        }

        #[test]
        fn test_wait_on_own_creation_is_a_cycle() {
            let tracker: CreationTracker<String> = CreationTracker::new();
            let a = "serviceA".to_string();
            tracker.start_creating(&a).unwrap();

            let cycle = tracker
                .begin_wait(&"serviceB".to_string(), std::thread::current().id())
                .unwrap_err();
            assert_eq!(cycle, vec!["serviceA", "serviceB"]);
        }

        #[test]
        fn test_finished_creation_releases_wait_registrations() {
            let tracker: Arc<CreationTracker<String>> = Arc::new(CreationTracker::new());
            let main = std::thread::current().id();
            let pool = "pool".to_string();
            tracker.start_creating(&pool).unwrap();

            // the waiter is released but never gets to clear its own registration
            let other = Arc::clone(&tracker);
            let waiter = std::thread::spawn(move || {
                other.start_creating(&"cache".to_string()).unwrap();
                other.begin_wait(&"pool".to_string(), main).unwrap();
                std::thread::current().id()
            })
            .join()
            .unwrap();

            // failed creation, then a retry by the same thread
            tracker.finish_creating(&pool);
            tracker.start_creating(&pool).unwrap();

            assert!(tracker.begin_wait(&"cache".to_string(), waiter).is_ok());
            tracker.end_wait();
        }

        #[test]
        fn test_validate_missing_dependency() {
            let mut deps = HashMap::new();
            deps.insert("serviceA".to_string(), vec!["serviceB".to_string()]);

            match validate_dependency_graph(&deps) {
                Err(DependencyValidationError::MissingDependency { bean, missing }) => {
                    assert_eq!(bean, "serviceA");
                    assert_eq!(missing, "serviceB");
                }
                other => panic!("Expected MissingDependency error, got {:?}", other),
            }
        }

        #[test]
        fn test_validate_circular_dependency() {
            let mut deps = HashMap::new();
            deps.insert("serviceA".to_string(), vec!["serviceB".to_string()]);
            deps.insert("serviceB".to_string(), vec!["serviceC".to_string()]);
            deps.insert("serviceC".to_string(), vec!["serviceA".to_string()]);

            match validate_dependency_graph(&deps) {
                Err(DependencyValidationError::CircularDependency { cycle }) => {
                    assert_eq!(cycle.len(), 4);
                    assert_eq!(cycle.first(), cycle.last());
                }
                other => panic!("Expected CircularDependency error, got {:?}", other),
            }
        }

        #[test]
        fn test_validate_valid_graph() {
            let mut deps = HashMap::new();
            deps.insert("config".to_string(), vec![]);
            deps.insert("database".to_string(), vec!["config".to_string()]);
            deps.insert(
                "userService".to_string(),
                vec!["database".to_string(), "config".to_string()],
            );

            assert!(validate_dependency_graph(&deps).is_ok());
        }

        #[test]
        fn test_destruction_order_puts_dependents_first() {
            // 创建顺序：config -> database -> userService
            let created = vec!["config", "database", "userService", "audit"];
            let mut deps = HashMap::new();
            deps.insert("database", vec!["config"]);
            deps.insert("userService", vec!["database", "config"]);

            let (order, cyclic) = destruction_order(&created, &deps);
            assert!(cyclic.is_empty());
            assert_eq!(order, vec!["audit", "userService", "database", "config"]);
        }

        #[test]
        fn test_destruction_order_ignores_creation_order_when_graph_disagrees() {
            // database 在 repository 之后创建（例如通过 Provider 延迟解析），但 repository 依赖它
            let created = vec!["repository", "database"];
            let mut deps = HashMap::new();
            deps.insert("repository", vec!["database"]);

            let (order, _) = destruction_order(&created, &deps);
            assert_eq!(order, vec!["repository", "database"]);
        }

        #[test]
        fn test_destruction_order_with_cycle() {
            let created = vec!["a", "b", "c"];
            let mut deps = HashMap::new();
            deps.insert("a", vec!["b"]);
            deps.insert("b", vec!["a"]);

            let (order, cyclic) = destruction_order(&created, &deps);
            assert_eq!(cyclic, vec!["b", "a"]);
            assert_eq!(order, vec!["c", "b", "a"]);
        }
    }
}
