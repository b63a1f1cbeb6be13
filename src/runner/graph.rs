//! Dependency ordering for requests within a file.
//!
//! Builds adjacency lists keyed by canonical request id (the name when
//! present, a stable synthetic id otherwise) and orders them with
//! Kahn's algorithm. Ties break by source order.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::spec::Request;

/// Returns request indices in a topological order of the `depends`
/// graph, or a circular-dependency error.
pub fn topo_order(requests: &[Request]) -> Result<Vec<usize>> {
    let ids: HashMap<&str, usize> = requests
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.name.as_deref().map(|n| (n, i)))
        .collect();

    // dependents[d] lists the requests waiting on d.
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); requests.len()];
    let mut indegree = vec![0usize; requests.len()];
    for (i, request) in requests.iter().enumerate() {
        for dep in &request.metadata.depends {
            // Unknown targets were already warned about at parse time.
            if let Some(&d) = ids.get(dep.as_str()) {
                dependents[d].push(i);
                indegree[i] += 1;
            }
        }
    }

    let mut order = Vec::with_capacity(requests.len());
    let mut ready: Vec<usize> = (0..requests.len()).filter(|&i| indegree[i] == 0).collect();
    while !ready.is_empty() {
        // Smallest index first keeps ties in source order.
        ready.sort_unstable();
        let next = ready.remove(0);
        order.push(next);
        for &dependent in &dependents[next] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                ready.push(dependent);
            }
        }
    }

    if order.len() < requests.len() {
        let stuck: Vec<String> = requests
            .iter()
            .enumerate()
            .filter(|(i, _)| !order.contains(i))
            .map(|(_, r)| r.label())
            .collect();
        return Err(Error::Execution(format!(
            "circular dependency detected among: {}",
            stuck.join(", ")
        )));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::parse_str;
    use std::path::Path;

    fn requests(source: &str) -> Vec<Request> {
        parse_str(source, Path::new("t.http")).unwrap().requests
    }

    #[test]
    fn test_no_dependencies_keeps_source_order() {
        let reqs = requests(concat!(
            "### a\nGET http://x/a\n",
            "### b\nGET http://x/b\n",
            "### c\nGET http://x/c\n",
        ));
        assert_eq!(topo_order(&reqs).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_dependency_runs_first() {
        let reqs = requests(concat!(
            "### b\n# @name b\n# @depends a\nGET http://x/b\n",
            "### a\n# @name a\nGET http://x/a\n",
        ));
        assert_eq!(topo_order(&reqs).unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_diamond() {
        let reqs = requests(concat!(
            "### root\n# @name root\nGET http://x/r\n",
            "### left\n# @name left\n# @depends root\nGET http://x/l\n",
            "### right\n# @name right\n# @depends root\nGET http://x/rt\n",
            "### join\n# @name join\n# @depends left, right\nGET http://x/j\n",
        ));
        assert_eq!(topo_order(&reqs).unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_cycle_detected() {
        let reqs = requests(concat!(
            "### a\n# @name a\n# @depends b\nGET http://x/a\n",
            "### b\n# @name b\n# @depends a\nGET http://x/b\n",
        ));
        let err = topo_order(&reqs).unwrap_err();
        assert!(err.to_string().contains("circular dependency"));
    }

    #[test]
    fn test_unknown_dependency_is_ignored_for_ordering() {
        let reqs = requests("# @depends ghost\nGET http://x/a\n");
        assert_eq!(topo_order(&reqs).unwrap(), vec![0]);
    }

    #[test]
    fn test_unnamed_requests_participate() {
        let reqs = requests(concat!(
            "### anon1\nGET http://x/1\n",
            "### named\n# @name named\nGET http://x/2\n",
            "### anon2\n# @depends named\nGET http://x/3\n",
        ));
        assert_eq!(topo_order(&reqs).unwrap(), vec![0, 1, 2]);
    }
}
