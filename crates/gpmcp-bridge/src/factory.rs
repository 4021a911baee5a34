use gpmcp_bridge_core::ProcessManagerFactory;

/// Platform-independent factory that selects the appropriate implementation at compile time
pub struct PlatformProcessManagerFactory;

impl ProcessManagerFactory for PlatformProcessManagerFactory {
    #[cfg(unix)]
    type Manager = gpmcp_bridge_unix::UnixProcessManager;

    #[cfg(windows)]
    type Manager = gpmcp_bridge_windows::WindowsProcessManager;

    fn create_process_manager() -> Self::Manager {
        #[cfg(unix)]
        return gpmcp_bridge_unix::UnixProcessManagerFactory::create_process_manager();

        #[cfg(windows)]
        return gpmcp_bridge_windows::WindowsProcessManagerFactory::create_process_manager();
    }

    fn platform_name() -> &'static str {
        #[cfg(unix)]
        return "unix";

        #[cfg(windows)]
        return "windows";
    }
}
