//! `RouterTable`/`RouterEntry`: the partition-to-host layout and the
//! replica-walk algorithm that derives replication neighbors for each
//! partition.
//!
//! Ported from the original's `partition/router_table.go`. `rep_partitions`
//! reproduces `repPartitions` field-for-field: walk partitions
//! `(i + partition) % total_partitions` for `i` in `1..total_partitions`,
//! skipping any partition this entry already masters, until
//! `replication_factor - 1` replicas are collected.

use std::collections::HashSet;
use std::sync::Arc;

use strest_types::DynMap;

use crate::error::ShardError;

#[derive(Debug, Clone, PartialEq)]
pub struct RouterEntry {
    pub address: String,
    pub json_port: u16,
    pub http_port: u16,
    pub is_self: bool,
    pub partitions: Vec<usize>,
    partitions_set: HashSet<usize>,
}

impl RouterEntry {
    pub fn new(address: impl Into<String>, json_port: u16, http_port: u16, partitions: Vec<usize>) -> Self {
        let partitions_set = partitions.iter().copied().collect();
        RouterEntry {
            address: address.into(),
            json_port,
            http_port,
            is_self: false,
            partitions,
            partitions_set,
        }
    }

    /// `address:json_port`, matching the original's `Id()`.
    pub fn id(&self) -> String {
        format!("{}:{}", self.address, self.json_port)
    }

    pub fn masters(&self, partition: usize) -> bool {
        self.partitions_set.contains(&partition)
    }

    pub(crate) fn from_dynmap(mp: &DynMap) -> Result<Self, ShardError> {
        let address = mp
            .get_str("address")
            .ok_or(ShardError::MissingField { field: "address" })?
            .to_string();
        let json_port = mp.must_int("ports.json", 0) as u16;
        let http_port = mp.must_int("ports.http", 0) as u16;
        let partitions: Vec<usize> = mp
            .get_int_slice("partitions")
            .ok_or(ShardError::MissingField { field: "partitions" })?
            .into_iter()
            .map(|p| p as usize)
            .collect();
        Ok(RouterEntry::new(address, json_port, http_port, partitions))
    }

    pub(crate) fn to_dynmap(&self) -> DynMap {
        let mut mp = DynMap::new();
        mp.put("address", self.address.clone());
        if self.json_port > 0 {
            let _ = mp.put_dotted("ports.json", self.json_port as i64);
        }
        if self.http_port > 0 {
            let _ = mp.put_dotted("ports.http", self.http_port as i64);
        }
        mp.put("id", self.id());
        mp.put(
            "partitions",
            self.partitions.iter().map(|p| *p as i64).collect::<Vec<_>>(),
        );
        mp
    }
}

#[derive(Debug, Clone)]
pub struct RouterTable {
    pub service: String,
    pub revision: i64,
    pub total_partitions: usize,
    pub replication_factor: usize,
    pub my_entry: Option<Arc<RouterEntry>>,
    pub entries: Vec<Arc<RouterEntry>>,
    /// Replica chain per partition; `[0]` is the master.
    pub entries_partition: Vec<Vec<Arc<RouterEntry>>>,
}

impl RouterTable {
    pub fn from_dynmap(mp: &DynMap) -> Result<Self, ShardError> {
        let service = mp
            .get_str("service")
            .ok_or(ShardError::MissingField { field: "service" })?
            .to_string();
        let revision = mp
            .get_i64("revision")
            .ok_or(ShardError::MissingField { field: "revision" })?;
        let total_partitions = mp
            .get_i64("total_partitions")
            .ok_or(ShardError::MissingField { field: "total_partitions" })? as usize;
        let replication_factor = mp
            .get_i64("replication_factor")
            .ok_or(ShardError::MissingField { field: "replication_factor" })? as usize;

        let entry_maps = mp
            .get_dynmap_slice("entries")
            .ok_or(ShardError::MissingField { field: "entries" })?;
        let mut entries = Vec::with_capacity(entry_maps.len());
        for em in &entry_maps {
            entries.push(Arc::new(RouterEntry::from_dynmap(*em)?));
        }

        let mut entries_by_partition: Vec<Option<Arc<RouterEntry>>> = vec![None; total_partitions];
        let mut accounted = 0usize;
        for entry in &entries {
            for &p in &entry.partitions {
                if p >= total_partitions {
                    return Err(ShardError::PartitionOutOfBounds {
                        partition: p,
                        total: total_partitions,
                    });
                }
                entries_by_partition[p] = Some(entry.clone());
                accounted += 1;
            }
        }
        if accounted != total_partitions {
            return Err(ShardError::IncompleteCoverage {
                accounted,
                total: total_partitions,
            });
        }

        let mut entries_partition = vec![Vec::new(); total_partitions];
        for entry in &entries {
            for &p in &entry.partitions {
                let replicas = rep_partitions(p, entry, total_partitions, replication_factor)?;
                let mut chain = Vec::with_capacity(replicas.len() + 1);
                chain.push(entry.clone());
                for r in replicas {
                    if let Some(e) = &entries_by_partition[r] {
                        chain.push(e.clone());
                    }
                }
                entries_partition[p] = chain;
            }
        }

        Ok(RouterTable {
            service,
            revision,
            total_partitions,
            replication_factor,
            my_entry: None,
            entries,
            entries_partition,
        })
    }

    pub fn to_dynmap(&self) -> DynMap {
        let mut mp = DynMap::new();
        mp.put("service", self.service.clone());
        mp.put("revision", self.revision);
        mp.put("total_partitions", self.total_partitions as i64);
        mp.put("replication_factor", self.replication_factor as i64);
        let entries: Vec<DynMap> = self.entries.iter().map(|e| e.to_dynmap()).collect();
        mp.put("entries", entries);
        mp
    }

    pub fn partition_entries(&self, partition: usize) -> Result<&[Arc<RouterEntry>], ShardError> {
        if partition >= self.total_partitions {
            return Err(ShardError::PartitionOutOfBounds {
                partition,
                total: self.total_partitions,
            });
        }
        Ok(&self.entries_partition[partition])
    }

    /// Marks the entry whose id matches `my_entry_id` as mine, for lookups
    /// like [`RouterTable::my_partitions`].
    pub fn with_self(mut self, my_entry_id: &str) -> Self {
        self.my_entry = self.entries.iter().find(|e| e.id() == my_entry_id).cloned();
        self
    }

    pub fn my_partitions(&self) -> HashSet<usize> {
        match &self.my_entry {
            Some(e) => e.partitions.iter().copied().collect(),
            None => HashSet::new(),
        }
    }
}

fn rep_partitions(
    partition: usize,
    entry: &RouterEntry,
    total_partitions: usize,
    replication_factor: usize,
) -> Result<Vec<usize>, ShardError> {
    if partition >= total_partitions {
        return Err(ShardError::PartitionOutOfBounds {
            partition,
            total: total_partitions,
        });
    }
    let mut replicas = Vec::new();
    let needed = replication_factor.saturating_sub(1);
    for i in 1..total_partitions {
        let candidate = (i + partition) % total_partitions;
        if entry.masters(candidate) {
            continue;
        }
        replicas.push(candidate);
        if replicas.len() == needed {
            break;
        }
    }
    Ok(replicas)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_of(entries: Vec<(&str, u16, Vec<usize>)>, total: usize, rep: usize) -> DynMap {
        let mut mp = DynMap::new();
        mp.put("service", "svc");
        mp.put("revision", 1i64);
        mp.put("total_partitions", total as i64);
        mp.put("replication_factor", rep as i64);
        let entry_maps: Vec<DynMap> = entries
            .into_iter()
            .map(|(addr, port, partitions)| {
                let mut e = DynMap::new();
                e.put("address", addr);
                let _ = e.put_dotted("ports.json", port as i64);
                e.put(
                    "partitions",
                    partitions.into_iter().map(|p| p as i64).collect::<Vec<_>>(),
                );
                e
            })
            .collect();
        mp.put("entries", entry_maps);
        mp
    }

    #[test]
    fn three_entries_twelve_partitions_replication_two() {
        let mp = table_of(
            vec![
                ("e1", 8009, (0..4).collect()),
                ("e2", 8009, (4..8).collect()),
                ("e3", 8009, (8..12).collect()),
            ],
            12,
            2,
        );
        let table = RouterTable::from_dynmap(&mp).unwrap();
        assert_eq!(table.total_partitions, 12);
        // partition 0 is mastered by e1; its one replica must come from a
        // different entry (the walk skips every partition e1 masters).
        let chain = table.partition_entries(0).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].address, "e1");
        assert_ne!(chain[1].address, "e1");
    }

    #[test]
    fn round_robin_layout_matches_the_documented_partition_scenario() {
        // total_partitions=12, replication_factor=2, E1=[0,3,6,9],
        // E2=[1,4,7,10], E3=[2,5,8,11]: PartitionEntries(0)=[E1,E2],
        // PartitionEntries(11)=[E3,E1].
        let mp = table_of(
            vec![
                ("e1", 8009, vec![0, 3, 6, 9]),
                ("e2", 8009, vec![1, 4, 7, 10]),
                ("e3", 8009, vec![2, 5, 8, 11]),
            ],
            12,
            2,
        );
        let table = RouterTable::from_dynmap(&mp).unwrap();

        let chain0 = table.partition_entries(0).unwrap();
        assert_eq!(chain0.iter().map(|e| e.address.as_str()).collect::<Vec<_>>(), vec!["e1", "e2"]);

        let chain11 = table.partition_entries(11).unwrap();
        assert_eq!(chain11.iter().map(|e| e.address.as_str()).collect::<Vec<_>>(), vec!["e3", "e1"]);
    }

    #[test]
    fn incomplete_partition_coverage_is_rejected() {
        let mp = table_of(vec![("e1", 8009, vec![0, 1])], 4, 1);
        assert!(matches!(
            RouterTable::from_dynmap(&mp),
            Err(ShardError::IncompleteCoverage { .. })
        ));
    }

    #[test]
    fn round_trips_through_dynmap() {
        let mp = table_of(vec![("e1", 8009, vec![0, 1, 2, 3])], 4, 1);
        let table = RouterTable::from_dynmap(&mp).unwrap();
        let back = RouterTable::from_dynmap(&table.to_dynmap()).unwrap();
        assert_eq!(back.service, table.service);
        assert_eq!(back.total_partitions, table.total_partitions);
    }
}
