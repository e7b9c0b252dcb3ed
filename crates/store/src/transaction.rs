use std::collections::BTreeMap;

use parking_lot::MutexGuard;

use vanlink_primitives::ids::{AccessPointId, InvitationId, LinkId, SiteId};
use vanlink_primitives::site::AccessPointKind;
use vanlink_primitives::state::StateKey;

use crate::records::{
    AccessPointRecord, CertificateRecord, InvitationRecord, LinkRecord, MemberSiteRecord,
    SiteRecord,
};
use crate::Tables;

/// Buffered writes for one table: `Some` is an upsert, `None` a delete.
type Overlay<K, V> = BTreeMap<K, Option<V>>;

#[derive(Debug, Default)]
struct Shadow {
    sites: Overlay<SiteId, SiteRecord>,
    access_points: Overlay<AccessPointId, AccessPointRecord>,
    links: Overlay<LinkId, LinkRecord>,
    invitations: Overlay<InvitationId, InvitationRecord>,
    members: Overlay<SiteId, MemberSiteRecord>,
    certificates: Overlay<(SiteId, StateKey), CertificateRecord>,
}

/// A transaction over the record store.
///
/// Writes land in a shadow overlay; reads consult the shadow first, then the
/// base tables. [`Transaction::commit`] applies the overlay atomically;
/// dropping the transaction without committing discards it (rollback).
#[derive(Debug)]
pub struct Transaction<'a> {
    tables: MutexGuard<'a, Tables>,
    shadow: Shadow,
}

fn read<K: Ord, V: Clone>(base: &BTreeMap<K, V>, shadow: &Overlay<K, V>, key: &K) -> Option<V> {
    match shadow.get(key) {
        Some(entry) => entry.clone(),
        None => base.get(key).cloned(),
    }
}

fn scan<K: Ord + Clone, V: Clone>(base: &BTreeMap<K, V>, shadow: &Overlay<K, V>) -> Vec<V> {
    let mut merged: BTreeMap<K, V> = base.clone();
    for (key, entry) in shadow {
        match entry {
            Some(value) => {
                let _previous = merged.insert(key.clone(), value.clone());
            }
            None => {
                let _previous = merged.remove(key);
            }
        }
    }
    merged.into_values().collect()
}

fn apply<K: Ord + Clone, V>(base: &mut BTreeMap<K, V>, shadow: Overlay<K, V>) {
    for (key, entry) in shadow {
        match entry {
            Some(value) => {
                let _previous = base.insert(key, value);
            }
            None => {
                let _previous = base.remove(&key);
            }
        }
    }
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(tables: MutexGuard<'a, Tables>) -> Self {
        Self {
            tables,
            shadow: Shadow::default(),
        }
    }

    /// Applies every buffered write to the base tables.
    pub fn commit(mut self) -> eyre::Result<()> {
        let shadow = std::mem::take(&mut self.shadow);

        apply(&mut self.tables.sites, shadow.sites);
        apply(&mut self.tables.access_points, shadow.access_points);
        apply(&mut self.tables.links, shadow.links);
        apply(&mut self.tables.invitations, shadow.invitations);
        apply(&mut self.tables.members, shadow.members);
        apply(&mut self.tables.certificates, shadow.certificates);

        Ok(())
    }

    // --- sites ---

    pub fn site(&self, id: &SiteId) -> eyre::Result<Option<SiteRecord>> {
        Ok(read(&self.tables.sites, &self.shadow.sites, id))
    }

    pub fn sites(&self) -> eyre::Result<Vec<SiteRecord>> {
        Ok(scan(&self.tables.sites, &self.shadow.sites))
    }

    pub fn put_site(&mut self, record: SiteRecord) -> eyre::Result<()> {
        let _previous = self.shadow.sites.insert(record.id.clone(), Some(record));
        Ok(())
    }

    /// Deletes a site, cascading to its access points, its certificates and
    /// its member row. Links referencing the site are left to the caller;
    /// topology edits are their own events.
    pub fn delete_site(&mut self, id: &SiteId) -> eyre::Result<()> {
        for access_point in self.access_points_of(id)? {
            let _previous = self.shadow.access_points.insert(access_point.id, None);
        }
        for certificate in self.certificates_of(id)? {
            let _previous = self
                .shadow
                .certificates
                .insert((certificate.site, certificate.key), None);
        }
        let _previous = self.shadow.members.insert(id.clone(), None);
        let _previous = self.shadow.sites.insert(id.clone(), None);
        Ok(())
    }

    // --- access points ---

    pub fn access_point(&self, id: &AccessPointId) -> eyre::Result<Option<AccessPointRecord>> {
        Ok(read(
            &self.tables.access_points,
            &self.shadow.access_points,
            id,
        ))
    }

    pub fn access_points(&self) -> eyre::Result<Vec<AccessPointRecord>> {
        Ok(scan(&self.tables.access_points, &self.shadow.access_points))
    }

    pub fn access_points_of(&self, site: &SiteId) -> eyre::Result<Vec<AccessPointRecord>> {
        Ok(self
            .access_points()?
            .into_iter()
            .filter(|ap| ap.site == *site)
            .collect())
    }

    pub fn manage_access_point_of(
        &self,
        site: &SiteId,
    ) -> eyre::Result<Option<AccessPointRecord>> {
        Ok(self
            .access_points_of(site)?
            .into_iter()
            .find(|ap| ap.kind == AccessPointKind::Manage))
    }

    pub fn put_access_point(&mut self, record: AccessPointRecord) -> eyre::Result<()> {
        let _previous = self
            .shadow
            .access_points
            .insert(record.id.clone(), Some(record));
        Ok(())
    }

    pub fn delete_access_point(&mut self, id: &AccessPointId) -> eyre::Result<()> {
        let _previous = self.shadow.access_points.insert(id.clone(), None);
        Ok(())
    }

    // --- links ---

    pub fn links(&self) -> eyre::Result<Vec<LinkRecord>> {
        Ok(scan(&self.tables.links, &self.shadow.links))
    }

    /// Links whose listening end is `site` — i.e. the edges other sites dial
    /// through it.
    pub fn links_listening_at(&self, site: &SiteId) -> eyre::Result<Vec<LinkRecord>> {
        Ok(self
            .links()?
            .into_iter()
            .filter(|link| link.listening == *site)
            .collect())
    }

    /// Links whose connecting end is `site`.
    pub fn links_connecting_from(&self, site: &SiteId) -> eyre::Result<Vec<LinkRecord>> {
        Ok(self
            .links()?
            .into_iter()
            .filter(|link| link.connecting == *site)
            .collect())
    }

    pub fn put_link(&mut self, record: LinkRecord) -> eyre::Result<()> {
        let _previous = self.shadow.links.insert(record.id.clone(), Some(record));
        Ok(())
    }

    pub fn delete_link(&mut self, id: &LinkId) -> eyre::Result<()> {
        let _previous = self.shadow.links.insert(id.clone(), None);
        Ok(())
    }

    // --- invitations ---

    pub fn invitation(&self, id: &InvitationId) -> eyre::Result<Option<InvitationRecord>> {
        Ok(read(&self.tables.invitations, &self.shadow.invitations, id))
    }

    pub fn put_invitation(&mut self, record: InvitationRecord) -> eyre::Result<()> {
        let _previous = self
            .shadow
            .invitations
            .insert(record.id.clone(), Some(record));
        Ok(())
    }

    // --- member sites ---

    pub fn member(&self, site: &SiteId) -> eyre::Result<Option<MemberSiteRecord>> {
        Ok(read(&self.tables.members, &self.shadow.members, site))
    }

    pub fn members(&self) -> eyre::Result<Vec<MemberSiteRecord>> {
        Ok(scan(&self.tables.members, &self.shadow.members))
    }

    pub fn put_member(&mut self, record: MemberSiteRecord) -> eyre::Result<()> {
        let _previous = self.shadow.members.insert(record.site.clone(), Some(record));
        Ok(())
    }

    // --- certificates ---

    pub fn certificate(
        &self,
        site: &SiteId,
        key: &StateKey,
    ) -> eyre::Result<Option<CertificateRecord>> {
        Ok(read(
            &self.tables.certificates,
            &self.shadow.certificates,
            &(site.clone(), key.clone()),
        ))
    }

    pub fn certificates_of(&self, site: &SiteId) -> eyre::Result<Vec<CertificateRecord>> {
        Ok(
            scan(&self.tables.certificates, &self.shadow.certificates)
                .into_iter()
                .filter(|certificate| certificate.site == *site)
                .collect(),
        )
    }

    pub fn put_certificate(&mut self, record: CertificateRecord) -> eyre::Result<()> {
        let _previous = self
            .shadow
            .certificates
            .insert((record.site.clone(), record.key.clone()), Some(record));
        Ok(())
    }

    pub fn delete_certificate(&mut self, site: &SiteId, key: &StateKey) -> eyre::Result<()> {
        let _previous = self
            .shadow
            .certificates
            .insert((site.clone(), key.clone()), None);
        Ok(())
    }
}
