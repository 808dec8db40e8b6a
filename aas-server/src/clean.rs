use std::collections::HashSet;
use std::sync::Arc;

use aas_adapters::capsvc::CapSvcClient;
use aas_adapters::directory::DirectoryClient;
use aas_adapters::models::CAP_PREFIX;
use aas_common::http::TokenCache;

use crate::args::CleanArgs;

/// Lists directory groups bearing the capability prefix that no longer
/// have a backing capability, for manual operator review.
///
/// Read-only by design: the upstream `clean` command this is grounded on
/// unassigns and deletes such groups outright, but spec.md's Non-goals
/// rule out the scheduled reconcilers ever deleting a capability group
/// whose capability has been archived, and an unreviewed one-shot delete
/// would undercut that guarantee just as easily as a scheduled one. This
/// only prints candidates; an operator deletes them by hand.
pub async fn run(args: &CleanArgs, au_name: &str) -> anyhow::Result<()> {
    let http = aas_common::http::client_without_keepalive();

    let azure_tokens = TokenCache::new(
        http.clone(),
        format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
            args.azure.tenant_id
        ),
        args.azure.client_id.clone(),
        args.azure.client_secret.clone(),
        Some("https://graph.microsoft.com/.default".to_string()),
        "AAS_AZURE_TOKEN",
    );
    let directory = Arc::new(DirectoryClient::new(
        http.clone(),
        azure_tokens,
        args.azure.internal_domain_suffix.clone(),
    ));

    let capsvc_tokens = TokenCache::new(
        http.clone(),
        format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
            args.azure.tenant_id
        ),
        args.capsvc.client_id.clone(),
        args.capsvc.client_secret.clone(),
        Some(args.capsvc.token_scope.clone()),
        "AAS_CAPSVC_TOKEN",
    );
    let capsvc = CapSvcClient::new(http, capsvc_tokens, args.capsvc.host.clone());

    let capabilities = capsvc.capabilities().await?;
    let live_root_ids: HashSet<String> = capabilities.into_iter().map(|c| c.root_id).collect();

    // `au_name` is accepted for symmetry with the scheduled reconcilers'
    // configuration surface but unused here: orphan detection only needs
    // the prefix-scoped group listing, not the administrative unit itself.
    let _ = au_name;

    let groups = directory.groups_by_prefix(CAP_PREFIX).await?;
    let orphans = find_orphans(&groups, &live_root_ids);

    if orphans.is_empty() {
        println!("no orphaned capability groups found");
        return Ok(());
    }

    println!("{} orphaned capability group(s) found:", orphans.len());
    for group in orphans {
        println!("  {} ({})", group.display_name, group.id);
    }

    Ok(())
}

/// Directory groups bearing the capability prefix whose root id has no
/// matching live capability. Groups whose display name isn't even
/// prefix-shaped (shouldn't happen given the `groups_by_prefix` filter,
/// but defends against a near-miss match) are ignored rather than flagged.
fn find_orphans<'a>(
    groups: &'a [aas_adapters::directory::GraphGroup],
    live_root_ids: &HashSet<String>,
) -> Vec<&'a aas_adapters::directory::GraphGroup> {
    groups
        .iter()
        .filter(|group| {
            group
                .display_name
                .strip_prefix(CAP_PREFIX)
                .map(str::trim)
                .is_some_and(|root_id| !live_root_ids.contains(root_id))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aas_adapters::directory::GraphGroup;

    fn group(display_name: &str) -> GraphGroup {
        GraphGroup {
            id: display_name.to_string(),
            display_name: display_name.to_string(),
            mail_nickname: String::new(),
        }
    }

    #[test]
    fn flags_groups_with_no_live_capability() {
        let groups = vec![group("CI_SSU_Cap - acme"), group("CI_SSU_Cap - contoso")];
        let live: HashSet<String> = ["acme".to_string()].into_iter().collect();

        let orphans = find_orphans(&groups, &live);
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].display_name, "CI_SSU_Cap - contoso");
    }

    #[test]
    fn no_orphans_when_every_group_has_a_live_capability() {
        let groups = vec![group("CI_SSU_Cap - acme")];
        let live: HashSet<String> = ["acme".to_string()].into_iter().collect();

        assert!(find_orphans(&groups, &live).is_empty());
    }
}
