pub mod inventory;
pub mod policy;
pub mod watch;

use windowcloak_capture::policy::Policy;

/// Human-readable summary of a policy
pub(crate) fn print_policy(policy: &Policy) {
    if policy.hidden_applications.is_empty() {
        println!("Hidden applications: none");
    } else {
        println!("Hidden applications:");
        for app_id in &policy.hidden_applications {
            match policy.hidden_windows_for(app_id) {
                Some(windows) => {
                    let ids: Vec<String> = windows.iter().map(|id| id.to_string()).collect();
                    println!("  {app_id} (windows {})", ids.join(", "));
                }
                None => println!("  {app_id}"),
            }
        }
    }
    println!("Cursor: {}", if policy.hide_cursor { "hidden" } else { "shown" });
    println!(
        "Own window: {}",
        if policy.show_own_window { "shown" } else { "hidden" }
    );
}
