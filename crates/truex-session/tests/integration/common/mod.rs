pub mod mock_fix;
