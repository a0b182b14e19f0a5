//! End-to-end scenarios over the full service stack.
//!
//! Tests: GeographyService / CatalogService / GrantEngine → InMemoryStore
//!
//! Verifies:
//! - Scope ancestry and labels come out of the hierarchy, never the caller
//! - Duplicate grants collapse to a single stored row
//! - Role and permission deletion keep the graph consistent

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use geoaccess_auth::{
        CredentialHasher, CredentialRecord, GrantRequest, NewUser, Scope, ScopeLevel, ScopeRef,
    };
    use geoaccess_core::{CountryId, DomainError, DomainResult, RoleId};

    use crate::services::AccessConsole;
    use crate::store::{DirectoryStore, InMemoryStore};

    /// Cheap deterministic hasher; Argon2 has its own tests.
    struct PlainHasher;

    impl CredentialHasher for PlainHasher {
        fn hash(&self, password: &str) -> DomainResult<CredentialRecord> {
            Ok(CredentialRecord::new(format!("plain${password}")))
        }
    }

    fn setup() -> (Arc<InMemoryStore>, AccessConsole<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let console = AccessConsole::new(Arc::clone(&store), Arc::new(PlainHasher));
        (store, console)
    }

    fn new_user(email: &str, password: &str, role_id: RoleId) -> NewUser {
        NewUser {
            name: email.split('@').next().unwrap_or_default().to_string(),
            email: email.to_string(),
            password: password.to_string(),
            role_id: Some(role_id),
            department_id: None,
        }
    }

    #[tokio::test]
    async fn santiago_grant_resolves_full_chain_and_label() {
        let (_, console) = setup();

        let chile = console.geography.create_country("Chile").await.unwrap();
        let rm = console.geography.create_region("Metropolitana", chile.id).await.unwrap();
        let santiago = console.geography.create_department("Santiago", rm.id).await.unwrap();
        let crear = console.catalog.create_permission("CrearAeronaves", None).await.unwrap();
        let role = console.catalog.create_role("operador", None).await.unwrap();

        let created = console
            .grants
            .create_user_with_grants(
                new_user("ana@example.com", "12345678", role.id),
                &[GrantRequest {
                    permission_id: crear.id,
                    scope: ScopeRef::Department(santiago.id),
                }],
            )
            .await
            .unwrap();

        let grant = &created.user.grants[0];
        assert_eq!(grant.permission.name, "CrearAeronaves");
        assert_eq!(grant.ancestry.level(), ScopeLevel::Department);
        assert_eq!(
            grant.scope,
            Scope {
                country_id: Some(chile.id),
                region_id: Some(rm.id),
                department_id: Some(santiago.id),
            }
        );

        let ancestry = console
            .resolver
            .resolve_ancestry(ScopeRef::Department(santiago.id))
            .await
            .unwrap();
        assert_eq!(ancestry.scope(), grant.scope);
        assert_eq!(
            console.resolver.describe_scope(&grant.scope).await.unwrap(),
            "Departamento Santiago · Región Metropolitana · País Chile"
        );
    }

    #[tokio::test]
    async fn identical_grants_in_one_batch_store_one_row() {
        let (store, console) = setup();
        let chile = console.geography.create_country("Chile").await.unwrap();
        let read = console.catalog.create_permission("read", None).await.unwrap();
        let role = console.catalog.create_role("operador", None).await.unwrap();

        let same = GrantRequest {
            permission_id: read.id,
            scope: ScopeRef::Country(chile.id),
        };
        let created = console
            .grants
            .create_user_with_grants(new_user("ana@example.com", "12345678", role.id), &[same, same])
            .await
            .unwrap();

        assert_eq!(created.grants.inserted.len(), 1);
        assert_eq!(created.grants.collapsed, 1);
        assert!(created.grants.skipped.is_empty());
        assert_eq!(store.grants(Some(created.user.id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn role_delete_blocked_until_permissions_detached() {
        let (_, console) = setup();
        let role = console.catalog.create_role("admin", None).await.unwrap();
        let read = console.catalog.create_permission("read", None).await.unwrap();
        console.catalog.assign_permission_to_role(role.id, read.id).await.unwrap();

        let err = console.catalog.delete_role(role.id).await.unwrap_err();
        assert!(matches!(err, DomainError::HasDependents(_)));

        console
            .catalog
            .revoke_permission_from_role(role.id, read.id)
            .await
            .unwrap();
        let removed = console.catalog.delete_role(role.id).await.unwrap();
        assert_eq!(removed.id, role.id);
    }

    #[tokio::test]
    async fn permission_delete_removes_role_links_and_user_grants() {
        let (store, console) = setup();
        let chile = console.geography.create_country("Chile").await.unwrap();
        let peru = console.geography.create_country("Peru").await.unwrap();
        let audit = console.catalog.create_permission("audit", None).await.unwrap();
        let keep = console.catalog.create_permission("keep", None).await.unwrap();
        let admin = console.catalog.create_role("admin", None).await.unwrap();
        let viewer = console.catalog.create_role("viewer", None).await.unwrap();

        console.catalog.assign_permission_to_role(admin.id, audit.id).await.unwrap();
        console.catalog.assign_permission_to_role(viewer.id, audit.id).await.unwrap();
        console.catalog.assign_permission_to_role(viewer.id, keep.id).await.unwrap();

        let grant = |permission_id, scope| GrantRequest { permission_id, scope };
        let ana = console
            .grants
            .create_user_with_grants(
                new_user("ana@example.com", "12345678", viewer.id),
                &[
                    grant(audit.id, ScopeRef::Global),
                    grant(audit.id, ScopeRef::Country(chile.id)),
                    grant(keep.id, ScopeRef::Global),
                ],
            )
            .await
            .unwrap();
        let luis = console
            .grants
            .create_user_with_grants(
                new_user("luis@example.com", "12345678", admin.id),
                &[grant(audit.id, ScopeRef::Country(peru.id))],
            )
            .await
            .unwrap();

        let removal = console.catalog.delete_permission(audit.id).await.unwrap();
        assert_eq!(removal.role_links_removed, 2);
        assert_eq!(removal.user_grants_removed, 3);

        let roles = console.catalog.list_roles().await.unwrap();
        assert!(roles.iter().all(|r| r.permissions.iter().all(|p| p.id != audit.id)));
        assert_eq!(store.grants(Some(ana.user.id)).await.unwrap().len(), 1);
        assert!(store.grants(Some(luis.user.id)).await.unwrap().is_empty());
        assert_eq!(console.catalog.list_permissions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn password_boundary_through_the_grant_engine() {
        let (_, console) = setup();
        let role = console.catalog.create_role("operador", None).await.unwrap();

        let err = console
            .grants
            .create_user_with_grants(new_user("ana@example.com", "1234567", role.id), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::WeakPassword { min_length: 8 }));

        console
            .grants
            .create_user_with_grants(new_user("ana@example.com", "12345678", role.id), &[])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn second_assignment_conflicts_and_leaves_list_unchanged() {
        let (_, console) = setup();
        let role = console.catalog.create_role("admin", None).await.unwrap();
        let read = console.catalog.create_permission("read", None).await.unwrap();

        let first = console.catalog.assign_permission_to_role(role.id, read.id).await.unwrap();
        let err = console
            .catalog
            .assign_permission_to_role(role.id, read.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::AlreadyAssigned(_)));

        let listed = console.catalog.list_roles().await.unwrap();
        assert_eq!(listed[0].permissions.len(), first.permissions.len());
    }

    #[tokio::test]
    async fn deleting_a_user_cascades_its_grants() {
        let (store, console) = setup();
        let role = console.catalog.create_role("operador", None).await.unwrap();
        let read = console.catalog.create_permission("read", None).await.unwrap();
        let created = console
            .grants
            .create_user_with_grants(
                new_user("ana@example.com", "12345678", role.id),
                &[GrantRequest {
                    permission_id: read.id,
                    scope: ScopeRef::Global,
                }],
            )
            .await
            .unwrap();

        console.directory.delete_user(created.user.id).await.unwrap();
        assert!(store.grants(None).await.unwrap().is_empty());
        assert!(console.directory.list_users().await.unwrap().is_empty());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn runtime() -> tokio::runtime::Runtime {
            tokio::runtime::Builder::new_current_thread()
                .build()
                .expect("test runtime")
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            /// Property: every created region is listed exactly once under its
            /// country, and the listing is ordered by name.
            #[test]
            fn created_regions_are_listed_once_in_name_order(
                names in proptest::collection::btree_set("[A-Za-z]{1,8}", 1..12),
                other in proptest::collection::btree_set("[A-Za-z]{1,8}", 0..4),
            ) {
                let (_, console) = setup();
                let listed = runtime().block_on(async {
                    let chile = console.geography.create_country("Chile").await.unwrap();
                    let peru = console.geography.create_country("Peru").await.unwrap();
                    for name in names.iter().rev() {
                        console.geography.create_region(name, chile.id).await.unwrap();
                    }
                    for name in &other {
                        console.geography.create_region(name, peru.id).await.unwrap();
                    }
                    console.geography.list_regions(Some(chile.id)).await.unwrap()
                });

                let listed_names: Vec<String> = listed.iter().map(|r| r.region.name.clone()).collect();
                let expected: Vec<String> = names.iter().cloned().collect();
                prop_assert_eq!(listed_names, expected);
                prop_assert!(listed.iter().all(|r| r.country.name == "Chile"));
            }

            /// Property: ancestry of a department never names another country.
            #[test]
            fn department_ancestry_matches_its_parents(regions in 1usize..4, per_region in 1usize..4) {
                let (_, console) = setup();
                runtime().block_on(async {
                    let chile = console.geography.create_country("Chile").await.unwrap();
                    console.geography.create_country("Peru").await.unwrap();
                    for r in 0..regions {
                        let region = console
                            .geography
                            .create_region(&format!("R{r}"), chile.id)
                            .await
                            .unwrap();
                        for d in 0..per_region {
                            let department = console
                                .geography
                                .create_department(&format!("D{d}"), region.id)
                                .await
                                .unwrap();
                            let ancestry = console
                                .resolver
                                .resolve_ancestry(ScopeRef::Department(department.id))
                                .await
                                .unwrap();
                            let scope = ancestry.scope();
                            assert_eq!(scope.department_id, Some(department.id));
                            assert_eq!(scope.region_id, Some(region.id));
                            assert_eq!(scope.country_id, Some(chile.id));
                            assert_ne!(scope.country_id, Some(CountryId::from_db(2)));
                        }
                    }
                });
            }
        }
    }
}
